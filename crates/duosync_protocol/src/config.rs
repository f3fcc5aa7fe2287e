//! Per-collection configuration.

use crate::error::{ProtocolError, ProtocolResult};
use crate::transform::{PROVENANCE_LOCAL_CREATED_AT, PROVENANCE_MIGRATED, REMOTE_CREATED_AT, REMOTE_UPDATED_AT};
use serde::{Deserialize, Serialize};

/// Strategy used to collapse a detected conflict to a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    /// The local value wins unconditionally.
    LocalWins,
    /// The remote value wins unconditionally.
    ServerWins,
    /// The side with the later timestamp wins; ties favor local.
    LatestWins,
    /// No automatic resolution; conflicts go to the conflict queue.
    Manual,
}

impl ResolutionStrategy {
    /// Returns true if this strategy resolves conflicts without manual input.
    pub fn auto_resolves(&self) -> bool {
        !matches!(self, ResolutionStrategy::Manual)
    }
}

/// A naming alias between a local field and a remote column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAlias {
    /// Field name in the local record shape (e.g. `modelName`).
    pub local: String,
    /// Column name in the remote row shape (e.g. `model_name`).
    pub remote: String,
}

/// Static per-collection behavior, loaded at startup and never renegotiated
/// mid-sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionConfig {
    /// Collection name as the local store knows it.
    pub name: String,
    /// Table name on the remote endpoint.
    pub remote_table: String,
    /// Key the local store files this collection under.
    pub local_key: String,
    /// Primary key column on the remote table.
    pub primary_key: String,
    /// Conflict resolution strategy for this collection.
    pub resolution_strategy: ResolutionStrategy,
    /// Dot-paths whose conflicts are classified medium severity.
    #[serde(default)]
    pub critical_fields: Vec<String>,
    /// Naming aliases between the two shapes.
    #[serde(default)]
    pub field_aliases: Vec<FieldAlias>,
}

impl CollectionConfig {
    /// Creates a configuration with conventional defaults: the local key is
    /// the collection name, the primary key is `id`, and the server wins
    /// conflicts.
    pub fn new(name: impl Into<String>, remote_table: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            local_key: name.clone(),
            name,
            remote_table: remote_table.into(),
            primary_key: "id".into(),
            resolution_strategy: ResolutionStrategy::ServerWins,
            critical_fields: Vec::new(),
            field_aliases: Vec::new(),
        }
    }

    /// Sets the resolution strategy.
    pub fn with_strategy(mut self, strategy: ResolutionStrategy) -> Self {
        self.resolution_strategy = strategy;
        self
    }

    /// Sets the primary key column.
    pub fn with_primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = key.into();
        self
    }

    /// Marks dot-paths as critical (medium conflict severity).
    pub fn with_critical_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.critical_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a local ↔ remote naming alias.
    pub fn with_alias(mut self, local: impl Into<String>, remote: impl Into<String>) -> Self {
        self.field_aliases.push(FieldAlias {
            local: local.into(),
            remote: remote.into(),
        });
        self
    }

    /// Maps a local field name to its remote column name.
    pub fn remote_name<'a>(&'a self, local: &'a str) -> &'a str {
        self.field_aliases
            .iter()
            .find(|a| a.local == local)
            .map_or(local, |a| a.remote.as_str())
    }

    /// Maps a remote column name to its local field name.
    pub fn local_name<'a>(&'a self, remote: &'a str) -> &'a str {
        self.field_aliases
            .iter()
            .find(|a| a.remote == remote)
            .map_or(remote, |a| a.local.as_str())
    }

    /// Validates the configuration, failing fast on programmer errors.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.name.is_empty() {
            return Err(ProtocolError::InvalidConfig("empty collection name".into()));
        }
        if self.remote_table.is_empty() {
            return Err(ProtocolError::InvalidConfig(format!(
                "collection {} has an empty remote table",
                self.name
            )));
        }
        if self.primary_key.is_empty() {
            return Err(ProtocolError::InvalidConfig(format!(
                "collection {} has an empty primary key",
                self.name
            )));
        }

        let reserved = [
            REMOTE_CREATED_AT,
            REMOTE_UPDATED_AT,
            PROVENANCE_MIGRATED,
            PROVENANCE_LOCAL_CREATED_AT,
        ];
        for alias in &self.field_aliases {
            if alias.local.is_empty() || alias.remote.is_empty() {
                return Err(ProtocolError::InvalidConfig(format!(
                    "collection {} has an empty field alias",
                    self.name
                )));
            }
            if reserved.contains(&alias.remote.as_str()) || alias.remote == self.primary_key {
                return Err(ProtocolError::InvalidConfig(format!(
                    "collection {} aliases reserved column {}",
                    self.name, alias.remote
                )));
            }
        }
        for (i, alias) in self.field_aliases.iter().enumerate() {
            for other in &self.field_aliases[i + 1..] {
                if alias.local == other.local || alias.remote == other.remote {
                    return Err(ProtocolError::InvalidConfig(format!(
                        "collection {} has duplicate alias for {}",
                        self.name, alias.local
                    )));
                }
            }
        }
        Ok(())
    }
}
