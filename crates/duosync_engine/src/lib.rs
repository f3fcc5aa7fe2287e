//! # Duosync Engine
//!
//! Hybrid synchronization and conflict-resolution engine keeping an
//! always-available local store and an eventually-reachable remote store in
//! agreement.
//!
//! This crate provides:
//! - `SyncEngine` for per-collection bidirectional diff/merge with
//!   field-level conflict detection and configurable resolution policies
//! - `EditLockManager` for edit locks with inactivity expiry and presence
//!   integration
//! - `RealtimeChannel` for incremental updates from a remote event stream
//!   between full syncs
//! - `ConflictQueue` for conflicts parked awaiting manual resolution
//! - Retry with linear backoff for transient remote failures
//!
//! ## Architecture
//!
//! Records are opaque keyed JSON documents; the engine reconciles two
//! copies of each and never assumes a single owner. Per-collection sync
//! passes are mutually exclusive; passes over different collections may run
//! concurrently. The engine targets eventual consistency: realtime events
//! apply last-arrival-wins and a full sync reconciles any transient
//! divergence.
//!
//! ## Key invariants
//!
//! - Never two concurrent passes over the same collection
//! - Pull never overwrites an existing local record
//! - A per-record failure never aborts its batch
//! - Conflict-queue mutations are atomic per entry
//! - Every suspending call is bounded by a retry count or timeout

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod locks;
mod queue;
mod realtime;
mod remote;
mod session;
mod store;

pub use config::{EngineConfig, RetryConfig};
pub use engine::{SyncDirection, SyncEngine, SyncReport, SyncStats, SyncStatus};
pub use error::{EngineError, EngineResult, RecordError, RemoteErrorKind};
pub use locks::{EditLockManager, LockClaim, LockEntry, LockKind};
pub use queue::{ConflictQueue, QueuedConflict};
pub use realtime::{ChannelState, MockRealtime, RealtimeChannel, RealtimeTransport};
pub use remote::{with_retry, MockRemote, RemoteClient};
pub use session::SyncSession;
pub use store::{MemoryStore, RecordStore};
