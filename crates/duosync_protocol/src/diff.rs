//! Field-level conflict detection.
//!
//! The detector walks two snapshots of the same record and emits a
//! [`Conflict`] for every dot-path leaf where the sides disagree. Nested
//! objects are recursed into; arrays are compared as opaque scalars (no
//! ordered-list merge is defined). A depth guard bounds pathological inputs:
//! at [`MAX_DIFF_DEPTH`] a subtree is compared wholesale.

use crate::config::CollectionConfig;
use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Maximum nesting depth the detector descends into.
pub const MAX_DIFF_DEPTH: usize = 8;

/// Which store a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// The device-local store.
    Local,
    /// The remote store.
    Remote,
}

/// How serious a field-level disagreement is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Ordinary content fields.
    Low,
    /// Fields the collection marks as critical.
    Medium,
    /// Identity or status-like fields.
    High,
}

/// A detected field-level disagreement between the two snapshots of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    /// Id of the record both snapshots describe.
    pub record_id: String,
    /// Dot-path of the disagreeing leaf.
    pub field: String,
    /// Value on the local side (null when absent).
    pub local_value: Value,
    /// Value on the remote side (null when absent).
    pub remote_value: Value,
    /// Modification time of the local snapshot.
    pub local_timestamp: Option<DateTime<Utc>>,
    /// Modification time of the remote snapshot.
    pub remote_timestamp: Option<DateTime<Utc>>,
    /// Classified severity.
    pub severity: Severity,
    /// Whether missing-value asymmetry allows resolving without a policy.
    pub auto_resolvable: bool,
}

/// Outcome of partitioning conflicts by auto-resolvability.
#[derive(Debug, Clone, Default)]
pub struct AutoResolution {
    /// Conflicts resolved by missing-value asymmetry.
    pub auto_resolved: Vec<AutoResolved>,
    /// Conflicts that need a policy decision or manual input.
    pub requires_manual: Vec<Conflict>,
}

/// An auto-resolved conflict and the side that supplied the value.
#[derive(Debug, Clone)]
pub struct AutoResolved {
    /// The original conflict.
    pub conflict: Conflict,
    /// The non-empty side.
    pub winner: Side,
}

impl AutoResolved {
    /// The winning value.
    pub fn value(&self) -> &Value {
        match self.winner {
            Side::Local => &self.conflict.local_value,
            Side::Remote => &self.conflict.remote_value,
        }
    }
}

/// Computes field-level conflicts between a local and a remote snapshot of
/// the same record.
///
/// Fails fast when either snapshot is not a JSON object; the caller treats
/// that as a per-record error rather than aborting the whole collection.
pub fn detect(
    config: &CollectionConfig,
    record_id: &str,
    local: &Value,
    remote: &Value,
    local_timestamp: Option<DateTime<Utc>>,
    remote_timestamp: Option<DateTime<Utc>>,
) -> ProtocolResult<Vec<Conflict>> {
    let local_map = local
        .as_object()
        .ok_or_else(|| ProtocolError::MalformedSnapshot {
            record_id: record_id.to_string(),
            side: "local",
        })?;
    let remote_map = remote
        .as_object()
        .ok_or_else(|| ProtocolError::MalformedSnapshot {
            record_id: record_id.to_string(),
            side: "remote",
        })?;

    let mut conflicts = Vec::new();
    walk(
        config,
        record_id,
        "",
        local_map,
        remote_map,
        1,
        local_timestamp,
        remote_timestamp,
        &mut conflicts,
    );
    Ok(conflicts)
}

#[allow(clippy::too_many_arguments)]
fn walk(
    config: &CollectionConfig,
    record_id: &str,
    prefix: &str,
    local: &Map<String, Value>,
    remote: &Map<String, Value>,
    depth: usize,
    local_timestamp: Option<DateTime<Utc>>,
    remote_timestamp: Option<DateTime<Utc>>,
    out: &mut Vec<Conflict>,
) {
    let keys: BTreeSet<&String> = local.keys().chain(remote.keys()).collect();
    let null = Value::Null;

    for key in keys {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        let lv = local.get(key).unwrap_or(&null);
        let rv = remote.get(key).unwrap_or(&null);

        if let (Value::Object(lm), Value::Object(rm)) = (lv, rv) {
            if depth < MAX_DIFF_DEPTH {
                walk(
                    config,
                    record_id,
                    &path,
                    lm,
                    rm,
                    depth + 1,
                    local_timestamp,
                    remote_timestamp,
                    out,
                );
                continue;
            }
            // At the depth limit the subtree is compared as one value.
        }

        if lv != rv {
            out.push(Conflict {
                record_id: record_id.to_string(),
                field: path.clone(),
                local_value: lv.clone(),
                remote_value: rv.clone(),
                local_timestamp,
                remote_timestamp,
                severity: classify(config, &path),
                auto_resolvable: is_empty(lv) != is_empty(rv),
            });
        }
    }
}

/// Classifies the severity of a disagreement at `path`.
fn classify(config: &CollectionConfig, path: &str) -> Severity {
    let leaf = path.rsplit('.').next().unwrap_or(path);
    if leaf == "id" || leaf == "status" || leaf == config.primary_key {
        Severity::High
    } else if config.critical_fields.iter().any(|f| f == path) {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Returns true for values the engine treats as "no content": null, absent,
/// the empty string, and empty containers. Zero is a value, not empty.
fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(m) => m.is_empty(),
        _ => false,
    }
}

/// Partitions conflicts into those resolvable by missing-value asymmetry
/// (the non-empty side wins) and those needing a policy or manual input.
pub fn auto_resolve(conflicts: Vec<Conflict>) -> AutoResolution {
    let mut outcome = AutoResolution::default();

    for conflict in conflicts {
        if conflict.auto_resolvable {
            let winner = if is_empty(&conflict.local_value) {
                Side::Remote
            } else {
                Side::Local
            };
            outcome.auto_resolved.push(AutoResolved { conflict, winner });
        } else {
            outcome.requires_manual.push(conflict);
        }
    }

    outcome
}

/// Looks up a dot-path inside a JSON value.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Writes `value` at a dot-path inside a field map, creating intermediate
/// objects as needed.
pub fn set_path(fields: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = fields;

    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_string(), value);
            return;
        }
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = entry.as_object_mut().unwrap_or_else(|| unreachable!());
    }
}
