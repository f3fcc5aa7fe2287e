//! Local record store abstraction.

use duosync_protocol::Record;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Synchronous key/value access to named collections on the device.
///
/// Persistence is the implementor's concern; the engine only needs these
/// operations and never assumes it is the sole owner of the data.
pub trait RecordStore: Send + Sync {
    /// Returns every record in a collection.
    fn list(&self, collection: &str) -> Vec<Record>;

    /// Returns one record by id.
    fn get(&self, collection: &str, id: &str) -> Option<Record>;

    /// Inserts or replaces a record.
    fn upsert(&self, collection: &str, record: Record);

    /// Removes a record, returning true if it existed.
    fn remove(&self, collection: &str, id: &str) -> bool;
}

/// An in-memory record store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Record>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }
}

impl RecordStore for MemoryStore {
    fn list(&self, collection: &str) -> Vec<Record> {
        self.collections
            .read()
            .get(collection)
            .map_or_else(Vec::new, |records| records.values().cloned().collect())
    }

    fn get(&self, collection: &str, id: &str) -> Option<Record> {
        self.collections.read().get(collection)?.get(id).cloned()
    }

    fn upsert(&self, collection: &str, record: Record) {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(record.id.clone(), record);
    }

    fn remove(&self, collection: &str, id: &str) -> bool {
        self.collections
            .write()
            .get_mut(collection)
            .is_some_and(|records| records.remove(id).is_some())
    }
}
