//! Bidirectional mapping between the local record shape and remote rows.
//!
//! The pair is a near-inverse: `to_local(config, &to_remote(config, &r))`
//! preserves every field present on the input, modulo the naming aliases and
//! the timestamp columns, which differ between the two shapes by design.

use crate::config::CollectionConfig;
use crate::error::{ProtocolError, ProtocolResult};
use crate::record::{Record, RemoteRecord};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Remote column holding the creation timestamp.
pub const REMOTE_CREATED_AT: &str = "created_at";
/// Remote column holding the modification timestamp.
pub const REMOTE_UPDATED_AT: &str = "updated_at";
/// Provenance marker attached to every outbound push.
pub const PROVENANCE_MIGRATED: &str = "migrated_from_local";
/// Provenance column recording the record's local creation time.
pub const PROVENANCE_LOCAL_CREATED_AT: &str = "local_created_at";

/// Transforms a local record into the flat remote row shape.
///
/// Missing timestamps default to now. Every outbound row carries the
/// `migrated_from_local` / `local_created_at` provenance pair.
pub fn to_remote(config: &CollectionConfig, record: &Record) -> RemoteRecord {
    let mut row = Map::new();

    for (name, value) in &record.fields {
        row.insert(config.remote_name(name).to_string(), value.clone());
    }

    let created_at = record.created_at.unwrap_or_else(Utc::now);
    let updated_at = record.updated_at.unwrap_or_else(Utc::now);

    row.insert(
        config.primary_key.clone(),
        Value::String(record.id.clone()),
    );
    row.insert(
        REMOTE_CREATED_AT.into(),
        Value::String(created_at.to_rfc3339()),
    );
    row.insert(
        REMOTE_UPDATED_AT.into(),
        Value::String(updated_at.to_rfc3339()),
    );
    row.insert(PROVENANCE_MIGRATED.into(), Value::Bool(true));
    row.insert(
        PROVENANCE_LOCAL_CREATED_AT.into(),
        Value::String(created_at.to_rfc3339()),
    );

    row
}

/// Transforms a remote row back into the local record shape.
///
/// The primary key and timestamp columns are lifted out of the field map;
/// provenance metadata is stripped.
pub fn to_local(config: &CollectionConfig, row: &RemoteRecord) -> ProtocolResult<Record> {
    let id = remote_id(config, row).ok_or_else(|| ProtocolError::MissingPrimaryKey {
        table: config.remote_table.clone(),
        key: config.primary_key.clone(),
    })?;

    let created_at = parse_timestamp(row, REMOTE_CREATED_AT)?;
    let updated_at = parse_timestamp(row, REMOTE_UPDATED_AT)?;

    let mut fields = Map::new();
    for (column, value) in row {
        if column == &config.primary_key
            || column == REMOTE_CREATED_AT
            || column == REMOTE_UPDATED_AT
            || column == PROVENANCE_MIGRATED
            || column == PROVENANCE_LOCAL_CREATED_AT
        {
            continue;
        }
        fields.insert(config.local_name(column).to_string(), value.clone());
    }

    Ok(Record {
        id,
        fields,
        created_at,
        updated_at,
    })
}

/// Extracts the primary key of a remote row as a string, if present.
pub fn remote_id(config: &CollectionConfig, row: &RemoteRecord) -> Option<String> {
    match row.get(&config.primary_key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_timestamp(row: &RemoteRecord, column: &str) -> ProtocolResult<Option<DateTime<Utc>>> {
    match row.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => DateTime::parse_from_rfc3339(raw)
            .map(|ts| Some(ts.with_timezone(&Utc)))
            .map_err(|_| ProtocolError::BadTimestamp {
                column: column.to_string(),
                value: raw.clone(),
            }),
        Some(other) => Err(ProtocolError::BadTimestamp {
            column: column.to_string(),
            value: other.to_string(),
        }),
    }
}
