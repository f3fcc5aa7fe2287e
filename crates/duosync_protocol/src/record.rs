//! Record shapes shared by the local and remote stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A flat JSON row as the remote relational endpoint sees it.
///
/// Column naming is snake_case; the transforms in [`crate::to_remote`] and
/// [`crate::to_local`] translate between this shape and [`Record`].
pub type RemoteRecord = Map<String, Value>;

/// A keyed JSON document as the local store sees it.
///
/// The engine treats `fields` as opaque: business semantics of the values
/// are the caller's concern. Identity is `id`, unique per collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Record identity, unique within its collection.
    pub id: String,
    /// The document body.
    pub fields: Map<String, Value>,
    /// Creation time, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification time, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Creates a record with no timestamps.
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
            created_at: None,
            updated_at: None,
        }
    }

    /// Sets both timestamps.
    pub fn with_timestamps(mut self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self.updated_at = Some(updated_at);
        self
    }

    /// Returns a top-level field value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Sets a top-level field value.
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    /// Stamps `updated_at` with the current time.
    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}
