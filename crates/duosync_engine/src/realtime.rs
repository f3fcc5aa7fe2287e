//! Realtime event pipeline.
//!
//! While connected, the channel consumes a typed event stream from the
//! transport and applies each event to the local store in arrival order; no
//! reordering or coalescing is performed. Out-of-order delivery therefore
//! resolves as last-applied-wins on the affected field until the next full
//! sync reconciles it (this engine targets eventual, not strong,
//! consistency).

use crate::error::{EngineError, EngineResult};
use crate::locks::EditLockManager;
use crate::store::RecordStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duosync_protocol::{
    remote_id, to_local, BroadcastEvent, CollectionConfig, MutationEnvelope, MutationKind,
    PresenceEvent, RealtimeEvent,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Connection state of the realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Not subscribed.
    Disconnected,
    /// Subscription attempt in flight.
    Connecting,
    /// Receiving events.
    Connected,
    /// The transport failed.
    Error,
    /// The subscribe acknowledgment did not arrive in time.
    TimedOut,
}

/// Produces the event stream the channel consumes.
///
/// `subscribe` resolves once the transport acknowledges the subscription;
/// the channel bounds the wait with its configured timeout.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Opens the subscription and returns the event stream.
    async fn subscribe(&self) -> EngineResult<mpsc::Receiver<RealtimeEvent>>;
}

struct HintEntry {
    event: BroadcastEvent,
    expires_at: Instant,
}

/// Shared pieces the dispatch task works against.
struct Dispatcher<S> {
    session_id: String,
    hint_ttl: Duration,
    collections: Arc<HashMap<String, CollectionConfig>>,
    store: Arc<S>,
    locks: Arc<EditLockManager>,
    state: Arc<RwLock<ChannelState>>,
    roster: Arc<Mutex<BTreeMap<String, DateTime<Utc>>>>,
    hints: Arc<Mutex<Vec<HintEntry>>>,
}

impl<S: RecordStore> Dispatcher<S> {
    fn dispatch(&self, event: RealtimeEvent) {
        match event {
            RealtimeEvent::Mutation(envelope) => self.apply_mutation(envelope),
            RealtimeEvent::Presence(presence) => self.apply_presence(presence),
            RealtimeEvent::Broadcast(broadcast) => {
                self.hints.lock().push(HintEntry {
                    event: broadcast,
                    expires_at: Instant::now() + self.hint_ttl,
                });
            }
        }
    }

    fn apply_mutation(&self, envelope: MutationEnvelope) {
        if envelope.actor.as_deref() == Some(self.session_id.as_str()) {
            debug!(table = %envelope.table, "suppressing echo of own mutation");
            return;
        }

        let Some(config) = self
            .collections
            .values()
            .find(|c| c.remote_table == envelope.table)
        else {
            debug!(table = %envelope.table, "mutation for unconfigured table ignored");
            return;
        };

        match envelope.event_type {
            MutationKind::Insert | MutationKind::Update => {
                let Some(row) = envelope.new else {
                    warn!(table = %envelope.table, "mutation event without a new row");
                    return;
                };
                match to_local(config, &row) {
                    Ok(record) => self.store.upsert(&config.name, record),
                    Err(err) => {
                        warn!(table = %envelope.table, error = %err, "dropping unmappable mutation")
                    }
                }
            }
            MutationKind::Delete => {
                let Some(row) = envelope.old else {
                    warn!(table = %envelope.table, "delete event without an old row");
                    return;
                };
                if let Some(id) = remote_id(config, &row) {
                    self.store.remove(&config.name, &id);
                }
            }
        }
    }

    fn apply_presence(&self, presence: PresenceEvent) {
        match presence {
            PresenceEvent::Join { user_id } => {
                self.roster.lock().insert(user_id, Utc::now());
            }
            PresenceEvent::Leave { user_id } => {
                self.roster.lock().remove(&user_id);
                self.locks.release_user(&user_id);
            }
        }
    }
}

/// Applies incremental remote updates to the local store between full syncs.
pub struct RealtimeChannel<S, T> {
    session_id: String,
    subscribe_timeout: Duration,
    hint_ttl: Duration,
    collections: Arc<HashMap<String, CollectionConfig>>,
    store: Arc<S>,
    locks: Arc<EditLockManager>,
    transport: Arc<T>,
    state: Arc<RwLock<ChannelState>>,
    roster: Arc<Mutex<BTreeMap<String, DateTime<Utc>>>>,
    hints: Arc<Mutex<Vec<HintEntry>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<S, T> RealtimeChannel<S, T>
where
    S: RecordStore + 'static,
    T: RealtimeTransport,
{
    /// Creates a disconnected channel.
    pub fn new(
        session_id: impl Into<String>,
        subscribe_timeout: Duration,
        hint_ttl: Duration,
        collections: Arc<HashMap<String, CollectionConfig>>,
        store: Arc<S>,
        locks: Arc<EditLockManager>,
        transport: Arc<T>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            subscribe_timeout,
            hint_ttl,
            collections,
            store,
            locks,
            transport,
            state: Arc::new(RwLock::new(ChannelState::Disconnected)),
            roster: Arc::new(Mutex::new(BTreeMap::new())),
            hints: Arc::new(Mutex::new(Vec::new())),
            task: Mutex::new(None),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ChannelState {
        *self.state.read()
    }

    /// Users currently present, sorted by id.
    pub fn roster(&self) -> Vec<String> {
        self.roster.lock().keys().cloned().collect()
    }

    /// Live broadcast hints; expired entries are pruned on read.
    pub fn active_hints(&self) -> Vec<BroadcastEvent> {
        let now = Instant::now();
        let mut hints = self.hints.lock();
        hints.retain(|hint| hint.expires_at > now);
        hints.iter().map(|hint| hint.event.clone()).collect()
    }

    /// Subscribes and starts the dispatch task.
    ///
    /// Reports `TimedOut` when the transport does not acknowledge within the
    /// configured bound, `Error` when it rejects the subscription.
    pub async fn connect(&self) -> EngineResult<()> {
        self.set_state(ChannelState::Connecting);

        let receiver =
            match tokio::time::timeout(self.subscribe_timeout, self.transport.subscribe()).await {
                Err(_) => {
                    self.set_state(ChannelState::TimedOut);
                    return Err(EngineError::Timeout);
                }
                Ok(Err(err)) => {
                    self.set_state(ChannelState::Error);
                    return Err(err);
                }
                Ok(Ok(receiver)) => receiver,
            };

        self.set_state(ChannelState::Connected);
        info!(session_id = %self.session_id, "realtime channel connected");

        let dispatcher = Dispatcher {
            session_id: self.session_id.clone(),
            hint_ttl: self.hint_ttl,
            collections: Arc::clone(&self.collections),
            store: Arc::clone(&self.store),
            locks: Arc::clone(&self.locks),
            state: Arc::clone(&self.state),
            roster: Arc::clone(&self.roster),
            hints: Arc::clone(&self.hints),
        };

        let handle = tokio::spawn(async move {
            let mut receiver = receiver;
            while let Some(event) = receiver.recv().await {
                dispatcher.dispatch(event);
            }
            // Stream ended: the transport went away underneath us.
            *dispatcher.state.write() = ChannelState::Disconnected;
        });

        if let Some(previous) = self.task.lock().replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    /// Stops the dispatch task and unsubscribes.
    pub fn disconnect(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.set_state(ChannelState::Disconnected);
    }

    /// Drops the current subscription and connects again.
    pub async fn reconnect(&self) -> EngineResult<()> {
        self.disconnect();
        self.connect().await
    }

    fn set_state(&self, state: ChannelState) {
        *self.state.write() = state;
    }
}

impl<S, T> Drop for RealtimeChannel<S, T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

/// An in-memory transport for tests.
///
/// Events pushed through [`MockRealtime::sender`] arrive on whichever
/// receiver the latest `subscribe` call handed out. `withhold_ack` makes
/// `subscribe` hang forever, for exercising the timeout path.
pub struct MockRealtime {
    sender: Mutex<mpsc::Sender<RealtimeEvent>>,
    pending: Mutex<Option<mpsc::Receiver<RealtimeEvent>>>,
    acknowledge: AtomicBool,
}

impl MockRealtime {
    /// Creates a transport that acknowledges subscriptions immediately.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel(64);
        Self {
            sender: Mutex::new(sender),
            pending: Mutex::new(Some(receiver)),
            acknowledge: AtomicBool::new(true),
        }
    }

    /// Handle for pushing events into the current subscription.
    pub fn sender(&self) -> mpsc::Sender<RealtimeEvent> {
        self.sender.lock().clone()
    }

    /// Makes future `subscribe` calls hang without acknowledging.
    pub fn withhold_ack(&self) {
        self.acknowledge.store(false, Ordering::SeqCst);
    }
}

impl Default for MockRealtime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealtimeTransport for MockRealtime {
    async fn subscribe(&self) -> EngineResult<mpsc::Receiver<RealtimeEvent>> {
        if !self.acknowledge.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let mut pending = self.pending.lock();
        if let Some(receiver) = pending.take() {
            return Ok(receiver);
        }
        // Re-subscribe: hand out a fresh stream and point the sender at it.
        let (sender, receiver) = mpsc::channel(64);
        *self.sender.lock() = sender;
        Ok(receiver)
    }
}
