//! Edit locks and their expiry timers.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Kind of claim an editor holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    /// A soft editing claim; auto-released after the inactivity timeout.
    Editing,
    /// A hard lock with no inactivity timer.
    HardLock,
}

/// A transient claim by one actor on a record or a single field of it.
#[derive(Debug, Clone)]
pub struct LockEntry {
    /// Locked record.
    pub record_id: String,
    /// Locked field, or `None` for the whole record.
    pub field_path: Option<String>,
    /// The claiming user.
    pub user_id: String,
    /// When the claim was made or last refreshed.
    pub started_at: DateTime<Utc>,
    /// Claim kind.
    pub kind: LockKind,
}

/// Outcome of a lock attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockClaim {
    /// True when a different user already holds the key.
    pub conflict: bool,
    /// The current holder, when `conflict` is true.
    pub owner: Option<String>,
}

impl LockClaim {
    fn granted() -> Self {
        Self {
            conflict: false,
            owner: None,
        }
    }

    fn held_by(owner: String) -> Self {
        Self {
            conflict: true,
            owner: Some(owner),
        }
    }
}

type LockKey = (String, Option<String>);

#[derive(Default)]
struct LockTable {
    locks: HashMap<LockKey, LockEntry>,
    timers: HashMap<LockKey, JoinHandle<()>>,
}

/// Tracks who is editing which record/field.
///
/// State machine per `(record_id, field_path)`:
/// `unlocked → locked(user) → unlocked`. At most one non-self claim may
/// exist per key; a second editor is rejected with a conflict signal, never
/// queued. Editing claims auto-release after the inactivity timeout via a
/// scheduled task that `end_editing` cancels.
pub struct EditLockManager {
    timeout: Duration,
    table: Arc<Mutex<LockTable>>,
}

impl EditLockManager {
    /// Creates a manager with the given inactivity timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            table: Arc::new(Mutex::new(LockTable::default())),
        }
    }

    /// Attempts to start editing a record or one of its fields.
    ///
    /// Re-acquiring one's own claim refreshes its timer and succeeds.
    /// Must be called from within a tokio runtime (the expiry timer is a
    /// spawned task).
    pub fn start_editing(
        &self,
        record_id: &str,
        user_id: &str,
        field_path: Option<&str>,
    ) -> LockClaim {
        self.claim(record_id, user_id, field_path, LockKind::Editing)
    }

    /// Attempts to take a hard lock on a whole record. Hard locks carry no
    /// inactivity timer.
    pub fn hard_lock(&self, record_id: &str, user_id: &str) -> LockClaim {
        self.claim(record_id, user_id, None, LockKind::HardLock)
    }

    fn claim(
        &self,
        record_id: &str,
        user_id: &str,
        field_path: Option<&str>,
        kind: LockKind,
    ) -> LockClaim {
        let key: LockKey = (record_id.to_string(), field_path.map(str::to_string));
        let mut table = self.table.lock();

        if let Some(existing) = table.locks.get(&key) {
            if existing.user_id != user_id {
                return LockClaim::held_by(existing.user_id.clone());
            }
        }

        table.locks.insert(
            key.clone(),
            LockEntry {
                record_id: record_id.to_string(),
                field_path: field_path.map(str::to_string),
                user_id: user_id.to_string(),
                started_at: Utc::now(),
                kind,
            },
        );

        if let Some(timer) = table.timers.remove(&key) {
            timer.abort();
        }
        if kind == LockKind::Editing {
            let handle = self.spawn_expiry(key.clone());
            table.timers.insert(key, handle);
        }

        LockClaim::granted()
    }

    fn spawn_expiry(&self, key: LockKey) -> JoinHandle<()> {
        let table = Arc::clone(&self.table);
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let mut table = table.lock();
            if let Some(entry) = table.locks.remove(&key) {
                debug!(
                    record_id = %entry.record_id,
                    user_id = %entry.user_id,
                    "edit lock expired"
                );
            }
            table.timers.remove(&key);
        })
    }

    /// Ends an editing claim and cancels its timer. Idempotent: ending a
    /// non-existent claim is not an error.
    pub fn end_editing(&self, record_id: &str, field_path: Option<&str>) {
        let key: LockKey = (record_id.to_string(), field_path.map(str::to_string));
        let mut table = self.table.lock();
        table.locks.remove(&key);
        if let Some(timer) = table.timers.remove(&key) {
            timer.abort();
        }
    }

    /// Releases every claim held by a user, e.g. on presence-leave.
    pub fn release_user(&self, user_id: &str) {
        let mut table = self.table.lock();
        let keys: Vec<LockKey> = table
            .locks
            .iter()
            .filter(|(_, entry)| entry.user_id == user_id)
            .map(|(key, _)| key.clone())
            .collect();

        for key in keys {
            table.locks.remove(&key);
            if let Some(timer) = table.timers.remove(&key) {
                timer.abort();
            }
        }
    }

    /// Returns the current holder of a key, if any.
    pub fn holder(&self, record_id: &str, field_path: Option<&str>) -> Option<String> {
        let key: LockKey = (record_id.to_string(), field_path.map(str::to_string));
        self.table
            .lock()
            .locks
            .get(&key)
            .map(|entry| entry.user_id.clone())
    }

    /// Returns a snapshot of every live claim.
    pub fn entries(&self) -> Vec<LockEntry> {
        self.table.lock().locks.values().cloned().collect()
    }

    /// Cancels every timer and drops every claim.
    pub fn dispose(&self) {
        let mut table = self.table.lock();
        for (_, timer) in table.timers.drain() {
            timer.abort();
        }
        table.locks.clear();
    }
}

impl Drop for EditLockManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> EditLockManager {
        EditLockManager::new(Duration::from_secs(30))
    }

    #[tokio::test]
    async fn lock_exclusivity() {
        let locks = manager();

        let claim = locks.start_editing("recordX", "userA", Some("name"));
        assert!(!claim.conflict);

        let rejected = locks.start_editing("recordX", "userB", Some("name"));
        assert!(rejected.conflict);
        assert_eq!(rejected.owner.as_deref(), Some("userA"));

        // A different field of the same record is a different key.
        let other_field = locks.start_editing("recordX", "userB", Some("stage"));
        assert!(!other_field.conflict);
    }

    #[tokio::test]
    async fn self_reacquire_is_not_a_conflict() {
        let locks = manager();
        assert!(!locks.start_editing("recordX", "userA", Some("name")).conflict);
        assert!(!locks.start_editing("recordX", "userA", Some("name")).conflict);
    }

    #[tokio::test]
    async fn end_editing_is_idempotent() {
        let locks = manager();
        locks.start_editing("recordX", "userA", Some("name"));

        locks.end_editing("recordX", Some("name"));
        locks.end_editing("recordX", Some("name"));

        assert!(!locks.start_editing("recordX", "userB", Some("name")).conflict);
    }

    #[tokio::test(start_paused = true)]
    async fn inactivity_timeout_releases_the_lock() {
        let locks = manager();
        locks.start_editing("recordX", "userA", Some("name"));
        assert_eq!(locks.holder("recordX", Some("name")).as_deref(), Some("userA"));

        tokio::time::sleep(Duration::from_secs(31)).await;

        assert!(locks.holder("recordX", Some("name")).is_none());
        assert!(!locks.start_editing("recordX", "userB", Some("name")).conflict);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_restarts_the_timer() {
        let locks = manager();
        locks.start_editing("recordX", "userA", Some("name"));

        tokio::time::sleep(Duration::from_secs(20)).await;
        locks.start_editing("recordX", "userA", Some("name"));
        tokio::time::sleep(Duration::from_secs(20)).await;

        // 40s since the first claim, but only 20s since the refresh.
        assert_eq!(locks.holder("recordX", Some("name")).as_deref(), Some("userA"));
    }

    #[tokio::test(start_paused = true)]
    async fn end_editing_cancels_the_timer() {
        let locks = manager();
        locks.start_editing("recordX", "userA", Some("name"));
        locks.end_editing("recordX", Some("name"));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(locks.entries().is_empty());
    }

    #[tokio::test]
    async fn release_user_drops_all_their_claims() {
        let locks = manager();
        locks.start_editing("recordX", "userA", Some("name"));
        locks.start_editing("recordY", "userA", None);
        locks.start_editing("recordZ", "userB", None);

        locks.release_user("userA");

        assert!(locks.holder("recordX", Some("name")).is_none());
        assert!(locks.holder("recordY", None).is_none());
        assert_eq!(locks.holder("recordZ", None).as_deref(), Some("userB"));
    }

    #[tokio::test(start_paused = true)]
    async fn hard_locks_do_not_expire() {
        let locks = manager();
        locks.hard_lock("recordX", "userA");

        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(locks.holder("recordX", None).as_deref(), Some("userA"));
        let rejected = locks.start_editing("recordX", "userB", None);
        assert!(rejected.conflict);
    }

    #[tokio::test]
    async fn dispose_clears_everything() {
        let locks = manager();
        locks.start_editing("recordX", "userA", Some("name"));
        locks.hard_lock("recordY", "userB");

        locks.dispose();
        assert!(locks.entries().is_empty());
    }
}
