//! Queue of conflicts awaiting manual resolution.

use chrono::{DateTime, Utc};
use duosync_protocol::Conflict;
use parking_lot::Mutex;

/// A conflict parked until manual input arrives.
#[derive(Debug, Clone)]
pub struct QueuedConflict {
    /// Collection the record belongs to.
    pub collection: String,
    /// The unresolved conflict.
    pub conflict: Conflict,
    /// When the conflict was queued.
    pub queued_at: DateTime<Utc>,
}

/// The one piece of state shared between autonomous sync passes and the
/// manual-resolution surface.
///
/// Mutations are atomic per entry: `take` is remove-if-present, so a
/// resolution request racing a later sync pass can never double-resolve a
/// superseded conflict. Entries survive until resolved; a re-queue of the
/// same `(collection, record, field)` replaces the stale entry.
#[derive(Debug, Default)]
pub struct ConflictQueue {
    entries: Mutex<Vec<QueuedConflict>>,
}

impl ConflictQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a conflict, replacing any entry for the same field.
    pub fn push(&self, collection: &str, conflict: Conflict) {
        let mut entries = self.entries.lock();
        entries.retain(|entry| {
            !(entry.collection == collection
                && entry.conflict.record_id == conflict.record_id
                && entry.conflict.field == conflict.field)
        });
        entries.push(QueuedConflict {
            collection: collection.to_string(),
            conflict,
            queued_at: Utc::now(),
        });
    }

    /// Removes and returns the entry for one field, if still queued.
    pub fn take(&self, collection: &str, record_id: &str, field: &str) -> Option<QueuedConflict> {
        let mut entries = self.entries.lock();
        let index = entries.iter().position(|entry| {
            entry.collection == collection
                && entry.conflict.record_id == record_id
                && entry.conflict.field == field
        })?;
        Some(entries.remove(index))
    }

    /// Returns the queued conflicts for one collection.
    pub fn pending(&self, collection: &str) -> Vec<QueuedConflict> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.collection == collection)
            .cloned()
            .collect()
    }

    /// Returns every queued conflict.
    pub fn all(&self) -> Vec<QueuedConflict> {
        self.entries.lock().clone()
    }

    /// Returns true if any conflict is queued for the collection.
    pub fn has_conflicts(&self, collection: &str) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|entry| entry.collection == collection)
    }

    /// Total number of queued conflicts.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
