//! Remote endpoint abstraction with retry.

use crate::config::RetryConfig;
use crate::error::{EngineError, EngineResult, RemoteErrorKind};
use async_trait::async_trait;
use duosync_protocol::RemoteRecord;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Async CRUD against the remote relational endpoint.
///
/// Implement this trait over the actual transport (an HTTP client, a
/// database driver, a loopback server for tests). The engine wraps every
/// call in [`with_retry`].
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Fetches every row of a table.
    async fn fetch_all(&self, table: &str) -> EngineResult<Vec<RemoteRecord>>;

    /// Inserts or replaces a row.
    async fn upsert(&self, table: &str, row: &RemoteRecord) -> EngineResult<()>;

    /// Deletes a row by primary key value.
    async fn delete(&self, table: &str, id: &str) -> EngineResult<()>;
}

/// Runs an operation, retrying transient failures with linear backoff.
///
/// Non-transient errors (auth, validation, remote conflicts) fail
/// immediately; transient ones are retried up to the configured attempt
/// count, then surfaced to the caller.
pub async fn with_retry<T, F, Fut>(retry: &RetryConfig, mut op: F) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EngineResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < retry.max_attempts => {
                attempt += 1;
                let delay = retry.delay_for_attempt(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "transient remote error, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// An in-memory remote endpoint for tests.
///
/// Rows are keyed by their `id` column. Failures can be scripted globally
/// (`fail_next`) or per row (`reject_id`), and an artificial latency can
/// hold calls in flight.
#[derive(Debug, Default)]
pub struct MockRemote {
    tables: RwLock<HashMap<String, BTreeMap<String, RemoteRecord>>>,
    fail_remaining: Mutex<Option<(RemoteErrorKind, u32)>>,
    rejected_ids: RwLock<HashSet<String>>,
    latency: Mutex<Option<Duration>>,
}

impl MockRemote {
    /// Creates an empty endpoint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a row directly, bypassing failure scripting.
    pub fn insert_row(&self, table: &str, row: RemoteRecord) {
        let id = row
            .get("id")
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default();
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .insert(id, row);
    }

    /// Returns a table's rows.
    pub fn rows(&self, table: &str) -> Vec<RemoteRecord> {
        self.tables
            .read()
            .get(table)
            .map_or_else(Vec::new, |rows| rows.values().cloned().collect())
    }

    /// Returns one row by id.
    pub fn row(&self, table: &str, id: &str) -> Option<RemoteRecord> {
        self.tables.read().get(table)?.get(id).cloned()
    }

    /// Makes the next `times` calls fail with the given classification.
    pub fn fail_next(&self, kind: RemoteErrorKind, times: u32) {
        *self.fail_remaining.lock() = Some((kind, times));
    }

    /// Makes upserts of the row with this id fail with a validation error.
    pub fn reject_id(&self, id: impl Into<String>) {
        self.rejected_ids.write().insert(id.into());
    }

    /// Adds artificial latency to every call.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    async fn check_call(&self) -> EngineResult<()> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut scripted = self.fail_remaining.lock();
        if let Some((kind, remaining)) = scripted.as_mut() {
            if *remaining > 0 {
                *remaining -= 1;
                let kind = *kind;
                if *remaining == 0 {
                    *scripted = None;
                }
                return Err(EngineError::Remote {
                    message: "scripted failure".into(),
                    kind,
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteClient for MockRemote {
    async fn fetch_all(&self, table: &str) -> EngineResult<Vec<RemoteRecord>> {
        self.check_call().await?;
        Ok(self.rows(table))
    }

    async fn upsert(&self, table: &str, row: &RemoteRecord) -> EngineResult<()> {
        self.check_call().await?;

        let id = row.get("id").and_then(Value::as_str).unwrap_or_default();
        if self.rejected_ids.read().contains(id) {
            return Err(EngineError::validation(format!("row {id} rejected")));
        }

        self.insert_row(table, row.clone());
        Ok(())
    }

    async fn delete(&self, table: &str, id: &str) -> EngineResult<()> {
        self.check_call().await?;
        if let Some(rows) = self.tables.write().get_mut(table) {
            rows.remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn row(id: &str) -> RemoteRecord {
        let mut row = RemoteRecord::new();
        row.insert("id".into(), json!(id));
        row
    }

    #[tokio::test]
    async fn mock_crud() {
        let remote = MockRemote::new();
        remote.upsert("projects", &row("p1")).await.unwrap();
        remote.upsert("projects", &row("p2")).await.unwrap();

        assert_eq!(remote.fetch_all("projects").await.unwrap().len(), 2);

        remote.delete("projects", "p1").await.unwrap();
        assert!(remote.row("projects", "p1").is_none());
        assert!(remote.row("projects", "p2").is_some());
    }

    #[tokio::test]
    async fn scripted_failures_drain() {
        let remote = MockRemote::new();
        remote.fail_next(RemoteErrorKind::Network, 2);

        assert!(remote.fetch_all("projects").await.is_err());
        assert!(remote.fetch_all("projects").await.is_err());
        assert!(remote.fetch_all("projects").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_recovers_from_transient_errors() {
        let remote = MockRemote::new();
        remote.insert_row("projects", row("p1"));
        remote.fail_next(RemoteErrorKind::Network, 2);

        let retry = RetryConfig::default();
        let rows = with_retry(&retry, || remote.fetch_all("projects"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_after_max_attempts() {
        let remote = MockRemote::new();
        remote.fail_next(RemoteErrorKind::Network, 10);

        let retry = RetryConfig::default();
        let err = with_retry(&retry, || remote.fetch_all("projects"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn non_transient_errors_fail_immediately() {
        let calls = AtomicU32::new(0);
        let retry = RetryConfig::default();

        let err = with_retry(&retry, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(EngineError::auth("bad token")) }
        })
        .await
        .unwrap_err();

        assert!(!err.is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_rows_fail_validation() {
        let remote = MockRemote::new();
        remote.reject_id("p1");

        let err = remote.upsert("projects", &row("p1")).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Remote {
                kind: RemoteErrorKind::Validation,
                ..
            }
        ));
        assert!(remote.upsert("projects", &row("p2")).await.is_ok());
    }
}
