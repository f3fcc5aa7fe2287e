//! One-per-process wiring of the engine, locks, and realtime channel.

use crate::config::EngineConfig;
use crate::engine::SyncEngine;
use crate::error::EngineResult;
use crate::locks::EditLockManager;
use crate::realtime::{RealtimeChannel, RealtimeTransport};
use crate::remote::RemoteClient;
use crate::store::RecordStore;
use duosync_protocol::CollectionConfig;
use std::sync::Arc;
use tracing::info;

/// Owns the moving parts of one sync session.
///
/// Construct one per process/session with injected stores and transport;
/// there is no ambient global state. [`SyncSession::dispose`] releases every
/// timer and subscription, after which the session should be dropped.
pub struct SyncSession<S, R, T> {
    engine: Arc<SyncEngine<S, R>>,
    locks: Arc<EditLockManager>,
    channel: Arc<RealtimeChannel<S, T>>,
}

impl<S, R, T> SyncSession<S, R, T>
where
    S: RecordStore + 'static,
    R: RemoteClient,
    T: RealtimeTransport,
{
    /// Wires up a session over the given stores and realtime transport.
    pub fn new(
        config: EngineConfig,
        collections: Vec<CollectionConfig>,
        store: Arc<S>,
        remote: Arc<R>,
        transport: Arc<T>,
    ) -> EngineResult<Self> {
        let locks = Arc::new(EditLockManager::new(config.lock_timeout));
        let engine = Arc::new(SyncEngine::new(
            config.clone(),
            collections,
            Arc::clone(&store),
            remote,
        )?);
        let channel = Arc::new(RealtimeChannel::new(
            config.session_id.clone(),
            config.subscribe_timeout,
            config.hint_ttl,
            engine.collections(),
            store,
            Arc::clone(&locks),
            transport,
        ));

        Ok(Self {
            engine,
            locks,
            channel,
        })
    }

    /// The sync engine.
    pub fn engine(&self) -> &Arc<SyncEngine<S, R>> {
        &self.engine
    }

    /// The edit-lock manager.
    pub fn locks(&self) -> &Arc<EditLockManager> {
        &self.locks
    }

    /// The realtime channel.
    pub fn channel(&self) -> &Arc<RealtimeChannel<S, T>> {
        &self.channel
    }

    /// Connects the realtime channel.
    pub async fn connect(&self) -> EngineResult<()> {
        self.channel.connect().await
    }

    /// Tears the session down: cancels pending lock timers and
    /// unsubscribes the realtime channel. A sync pass in flight is allowed
    /// to complete; its result is simply ignored.
    pub fn dispose(&self) {
        self.locks.dispose();
        self.channel.disconnect();
        info!("sync session disposed");
    }
}
