//! Typed realtime event envelopes.
//!
//! These are the three event classes the realtime channel consumes while
//! connected: committed mutations, presence changes, and ephemeral
//! broadcast hints.

use crate::record::RemoteRecord;
use serde::{Deserialize, Serialize};

/// Kind of committed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MutationKind {
    /// A row was inserted.
    Insert,
    /// A row was updated.
    Update,
    /// A row was deleted.
    Delete,
}

/// A committed remote mutation, applied incrementally to the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationEnvelope {
    /// What happened.
    pub event_type: MutationKind,
    /// Remote table the row belongs to.
    pub table: String,
    /// The row after the mutation (insert/update).
    pub new: Option<RemoteRecord>,
    /// The row before the mutation (update/delete).
    pub old: Option<RemoteRecord>,
    /// Session that caused the mutation, when the transport reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

/// A presence change in the connected roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PresenceEvent {
    /// A user connected.
    Join {
        /// The joining user.
        user_id: String,
    },
    /// A user disconnected; their edit locks are released.
    Leave {
        /// The leaving user.
        user_id: String,
    },
}

impl PresenceEvent {
    /// The user this event concerns.
    pub fn user_id(&self) -> &str {
        match self {
            PresenceEvent::Join { user_id } | PresenceEvent::Leave { user_id } => user_id,
        }
    }
}

/// Kind of ephemeral broadcast hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BroadcastKind {
    /// Someone is typing.
    Typing,
    /// Someone began editing a field.
    EditStart,
    /// Someone stopped editing a field.
    EditEnd,
}

/// A time-boxed UI hint; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastEvent {
    /// Hint kind.
    pub kind: BroadcastKind,
    /// Record the hint concerns.
    pub record_id: String,
    /// Field the hint concerns, if field-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// User the hint came from.
    pub user_id: String,
}

/// Any event the realtime channel can receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "lowercase")]
pub enum RealtimeEvent {
    /// A committed mutation.
    Mutation(MutationEnvelope),
    /// A presence change.
    Presence(PresenceEvent),
    /// An ephemeral broadcast hint.
    Broadcast(BroadcastEvent),
}
