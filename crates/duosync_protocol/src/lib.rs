//! # Duosync Protocol
//!
//! Shared types and pure algorithms for the duosync engine.
//!
//! This crate provides:
//! - `Record` and the flat remote row shape
//! - `CollectionConfig` with per-collection resolution strategies
//! - Bidirectional field transforms (local ↔ remote naming)
//! - Field-level conflict detection (recursive structural diff)
//! - Conflict resolution strategies
//! - Realtime event envelopes
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod diff;
mod error;
mod events;
mod record;
mod resolve;
mod transform;

pub use config::{CollectionConfig, FieldAlias, ResolutionStrategy};
pub use diff::{
    auto_resolve, detect, get_path, set_path, AutoResolution, AutoResolved, Conflict, Severity,
    Side, MAX_DIFF_DEPTH,
};
pub use error::{ProtocolError, ProtocolResult};
pub use events::{BroadcastEvent, BroadcastKind, MutationEnvelope, MutationKind, PresenceEvent, RealtimeEvent};
pub use record::{Record, RemoteRecord};
pub use resolve::{FieldResolution, Resolution, ResolutionRequest};
pub use transform::{
    remote_id, to_local, to_remote, PROVENANCE_LOCAL_CREATED_AT, PROVENANCE_MIGRATED,
    REMOTE_CREATED_AT, REMOTE_UPDATED_AT,
};
