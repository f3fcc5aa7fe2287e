//! Error types for the sync engine.

use duosync_protocol::ProtocolError;
use serde::Serialize;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Classification of a remote endpoint failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Connectivity problem; worth retrying.
    Network,
    /// Authentication or authorization failure.
    Auth,
    /// The endpoint rejected the payload.
    Validation,
    /// The endpoint reported a write conflict.
    Conflict,
}

/// Errors that can occur during engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The remote endpoint failed.
    #[error("remote error: {message}")]
    Remote {
        /// Error message from the endpoint or transport.
        message: String,
        /// Failure classification.
        kind: RemoteErrorKind,
    },

    /// No collection with this name is configured.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    /// A collection configuration failed validation at startup.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A protocol-level operation failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The realtime channel failed.
    #[error("realtime channel error: {0}")]
    Channel(String),

    /// A bounded operation timed out.
    #[error("operation timed out")]
    Timeout,
}

impl EngineError {
    /// Creates a retryable network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            kind: RemoteErrorKind::Network,
        }
    }

    /// Creates a non-retryable authentication error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            kind: RemoteErrorKind::Auth,
        }
    }

    /// Creates a non-retryable validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            kind: RemoteErrorKind::Validation,
        }
    }

    /// Creates a non-retryable remote write-conflict error.
    pub fn remote_conflict(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            kind: RemoteErrorKind::Conflict,
        }
    }

    /// Returns true if retrying the operation could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Remote {
                kind: RemoteErrorKind::Network,
                ..
            } | EngineError::Timeout
        )
    }

    /// Returns true for connectivity-level failures that abort a whole
    /// collection pass rather than a single record.
    pub fn is_connectivity(&self) -> bool {
        self.is_retryable()
    }
}

/// A failure scoped to one record inside a batch; aggregated, never thrown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordError {
    /// Id of the record that failed.
    pub record_id: String,
    /// What went wrong.
    pub message: String,
}

impl RecordError {
    /// Creates a record error.
    pub fn new(record_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            message: message.into(),
        }
    }
}
