//! Error types for protocol operations.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur in pure protocol operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A collection configuration failed validation.
    #[error("invalid collection config: {0}")]
    InvalidConfig(String),

    /// A snapshot handed to the conflict detector was not a JSON object.
    #[error("malformed {side} snapshot for record {record_id}: not a JSON object")]
    MalformedSnapshot {
        /// Id of the record whose snapshot was malformed.
        record_id: String,
        /// Which side the snapshot came from (`local` or `remote`).
        side: &'static str,
    },

    /// A remote row carried no usable primary key.
    #[error("remote row in table {table} is missing primary key {key}")]
    MissingPrimaryKey {
        /// Remote table name.
        table: String,
        /// Expected primary key column.
        key: String,
    },

    /// A timestamp column could not be parsed as RFC 3339.
    #[error("unparseable timestamp in column {column}: {value}")]
    BadTimestamp {
        /// Column the value came from.
        column: String,
        /// The offending raw value.
        value: String,
    },
}
