//! Sync orchestration per collection.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, RecordError};
use crate::queue::ConflictQueue;
use crate::remote::{with_retry, RemoteClient};
use crate::store::RecordStore;
use duosync_protocol::{
    auto_resolve, detect, remote_id, set_path, to_local, to_remote, CollectionConfig, Conflict,
    Record, RemoteRecord, Resolution, ResolutionRequest, Side,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which way a sync pass moves data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    /// Remote → local only.
    Pull,
    /// Local → remote only.
    Push,
    /// Both directions plus conflict reconciliation.
    Both,
}

impl SyncDirection {
    fn includes_push(self) -> bool {
        matches!(self, SyncDirection::Push | SyncDirection::Both)
    }

    fn includes_pull(self) -> bool {
        matches!(self, SyncDirection::Pull | SyncDirection::Both)
    }
}

/// Per-collection sync state, overwritten by the latest attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Never synced, or reset.
    Idle,
    /// A pass is in flight.
    Syncing,
    /// The last pass completed cleanly.
    Success,
    /// The last pass failed, or recorded per-record errors.
    Error,
    /// Conflicts are queued awaiting manual resolution.
    Conflict,
}

/// Result of one sync pass, returned to callers and logged.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Collection the pass ran over.
    pub data_type: String,
    /// Direction of the pass.
    pub direction: SyncDirection,
    /// Records in the local snapshot.
    pub local_count: usize,
    /// Rows in the remote snapshot.
    pub remote_count: usize,
    /// Records moved or converged by this pass.
    pub synced: usize,
    /// Per-record failures; never fatal to the batch.
    pub errors: Vec<RecordError>,
    /// Conflicts left unresolved and queued.
    pub conflicts: Vec<Conflict>,
    /// True when the pass was skipped (disabled or already in flight).
    pub no_op: bool,
}

impl SyncReport {
    fn no_op(collection: &str, direction: SyncDirection) -> Self {
        Self {
            data_type: collection.to_string(),
            direction,
            local_count: 0,
            remote_count: 0,
            synced: 0,
            errors: Vec::new(),
            conflicts: Vec::new(),
            no_op: true,
        }
    }
}

/// Running counters across every pass of this engine instance.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Completed passes.
    pub runs_completed: u64,
    /// Records pushed to the remote store.
    pub records_pushed: u64,
    /// Records pulled into the local store.
    pub records_pulled: u64,
    /// Conflicts resolved without manual input.
    pub conflicts_auto_resolved: u64,
    /// Conflicts parked in the queue.
    pub conflicts_queued: u64,
    /// Message of the most recent collection-level failure.
    pub last_error: Option<String>,
}

/// Removes the collection from the in-flight set when the pass ends,
/// whichever way it ends.
struct InFlightGuard<'a> {
    flags: &'a Mutex<HashSet<String>>,
    collection: String,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flags: &'a Mutex<HashSet<String>>, collection: &str) -> Option<Self> {
        if !flags.lock().insert(collection.to_string()) {
            return None;
        }
        Some(Self {
            flags,
            collection: collection.to_string(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flags.lock().remove(&self.collection);
    }
}

/// Orchestrates bidirectional synchronization between the two stores.
///
/// The engine never runs two passes over the same collection concurrently;
/// passes over different collections may overlap. All state is owned by the
/// instance, so nothing leaks between sessions.
pub struct SyncEngine<S, R> {
    config: EngineConfig,
    collections: Arc<HashMap<String, CollectionConfig>>,
    store: Arc<S>,
    remote: Arc<R>,
    queue: Arc<ConflictQueue>,
    statuses: RwLock<HashMap<String, SyncStatus>>,
    in_flight: Mutex<HashSet<String>>,
    enabled: AtomicBool,
    stats: RwLock<SyncStats>,
}

impl<S, R> SyncEngine<S, R>
where
    S: RecordStore,
    R: RemoteClient,
{
    /// Creates an engine over the given stores.
    ///
    /// Collection configurations are validated fail-fast; a duplicate or
    /// malformed entry is a programmer error.
    pub fn new(
        config: EngineConfig,
        collections: Vec<CollectionConfig>,
        store: Arc<S>,
        remote: Arc<R>,
    ) -> EngineResult<Self> {
        let mut indexed = HashMap::new();
        for collection in collections {
            collection.validate()?;
            let name = collection.name.clone();
            if indexed.insert(name.clone(), collection).is_some() {
                return Err(EngineError::InvalidConfig(format!(
                    "duplicate collection {name}"
                )));
            }
        }

        Ok(Self {
            config,
            collections: Arc::new(indexed),
            store,
            remote,
            queue: Arc::new(ConflictQueue::new()),
            statuses: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            enabled: AtomicBool::new(true),
            stats: RwLock::new(SyncStats::default()),
        })
    }

    /// The configured collections, shared with the realtime channel.
    pub fn collections(&self) -> Arc<HashMap<String, CollectionConfig>> {
        Arc::clone(&self.collections)
    }

    /// The conflict queue, shared with the manual-resolution surface.
    pub fn queue(&self) -> Arc<ConflictQueue> {
        Arc::clone(&self.queue)
    }

    /// Globally enables or disables syncing.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// True unless syncing was disabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// The collection's sync status.
    pub fn status(&self, collection: &str) -> SyncStatus {
        self.statuses
            .read()
            .get(collection)
            .copied()
            .unwrap_or(SyncStatus::Idle)
    }

    /// A snapshot of the running counters.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    fn set_status(&self, collection: &str, status: SyncStatus) {
        self.statuses
            .write()
            .insert(collection.to_string(), status);
    }

    fn fail(&self, collection: &str, err: &EngineError) {
        warn!(collection, error = %err, "sync pass failed");
        self.set_status(collection, SyncStatus::Error);
        self.stats.write().last_error = Some(err.to_string());
    }

    /// Runs one sync pass over a collection.
    ///
    /// Returns a no-op report when syncing is disabled or a pass for the
    /// same collection is already in flight. A collection-level remote
    /// failure aborts with `Err`; per-record failures are aggregated in the
    /// report.
    pub async fn sync_collection(
        &self,
        name: &str,
        direction: SyncDirection,
    ) -> EngineResult<SyncReport> {
        let config = self
            .collections
            .get(name)
            .ok_or_else(|| EngineError::UnknownCollection(name.to_string()))?;

        if !self.is_enabled() {
            debug!(collection = name, "sync disabled, skipping");
            return Ok(SyncReport::no_op(name, direction));
        }
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, name) else {
            debug!(collection = name, "sync already in flight, skipping");
            return Ok(SyncReport::no_op(name, direction));
        };

        self.set_status(name, SyncStatus::Syncing);
        info!(collection = name, ?direction, "sync started");

        let local = self.store.list(&config.local_key);
        let rows = match with_retry(&self.config.retry, || {
            self.remote.fetch_all(&config.remote_table)
        })
        .await
        {
            Ok(rows) => rows,
            Err(err) => {
                self.fail(name, &err);
                return Err(err);
            }
        };

        let remote_index: HashMap<String, &RemoteRecord> = rows
            .iter()
            .filter_map(|row| remote_id(config, row).map(|id| (id, row)))
            .collect();

        let mut report = SyncReport {
            data_type: name.to_string(),
            direction,
            local_count: local.len(),
            remote_count: rows.len(),
            synced: 0,
            errors: Vec::new(),
            conflicts: Vec::new(),
            no_op: false,
        };
        let mut pushed = 0usize;
        let mut pulled = 0usize;
        let mut auto_resolved_total = 0usize;

        if direction.includes_push() {
            match self
                .push_records(config, &local, &remote_index, direction, &mut report)
                .await
            {
                Ok(count) => pushed = count,
                Err(err) => {
                    self.fail(name, &err);
                    return Err(err);
                }
            }
        }

        if direction.includes_pull() {
            pulled = self.pull_records(config, &local, &rows, &mut report);
        }

        if direction == SyncDirection::Both {
            match self
                .reconcile(config, &local, &remote_index, &mut report)
                .await
            {
                Ok(auto_resolved) => auto_resolved_total = auto_resolved,
                Err(err) => {
                    self.fail(name, &err);
                    return Err(err);
                }
            }
        }

        report.synced += pushed + pulled;

        let status = if !report.conflicts.is_empty() || self.queue.has_conflicts(name) {
            SyncStatus::Conflict
        } else if !report.errors.is_empty() {
            SyncStatus::Error
        } else {
            SyncStatus::Success
        };
        self.set_status(name, status);

        {
            let mut stats = self.stats.write();
            stats.runs_completed += 1;
            stats.records_pushed += pushed as u64;
            stats.records_pulled += pulled as u64;
            stats.conflicts_auto_resolved += auto_resolved_total as u64;
            stats.conflicts_queued += report.conflicts.len() as u64;
        }

        info!(
            collection = name,
            synced = report.synced,
            errors = report.errors.len(),
            conflicts = report.conflicts.len(),
            "sync finished"
        );
        Ok(report)
    }

    /// Pushes local records to the remote store.
    ///
    /// In a `Both` pass, ids present on both sides are conflict territory
    /// and are skipped here; in an explicit `Push`, the local shape
    /// overwrites the remote one, skipping rows that already match so a
    /// repeated pass moves nothing.
    async fn push_records(
        &self,
        config: &CollectionConfig,
        local: &[Record],
        remote_index: &HashMap<String, &RemoteRecord>,
        direction: SyncDirection,
        report: &mut SyncReport,
    ) -> EngineResult<usize> {
        let mut pushed = 0usize;

        for record in local {
            let existing = remote_index.get(&record.id).copied();
            if direction == SyncDirection::Both && existing.is_some() {
                continue;
            }
            if let Some(row) = existing {
                if let Ok(current) = to_local(config, row) {
                    if current.fields == record.fields {
                        continue;
                    }
                }
            }

            let row = to_remote(config, record);
            match with_retry(&self.config.retry, || {
                self.remote.upsert(&config.remote_table, &row)
            })
            .await
            {
                Ok(()) => pushed += 1,
                // Connectivity loss is collection-level: abort the batch.
                Err(err) if err.is_connectivity() => return Err(err),
                Err(err) => {
                    warn!(collection = %config.name, record_id = %record.id, error = %err, "record push failed");
                    report.errors.push(RecordError::new(record.id.as_str(), err.to_string()));
                }
            }
        }

        Ok(pushed)
    }

    /// Appends remote rows that are absent locally. Pull never overwrites an
    /// existing local record.
    fn pull_records(
        &self,
        config: &CollectionConfig,
        local: &[Record],
        rows: &[RemoteRecord],
        report: &mut SyncReport,
    ) -> usize {
        let local_ids: HashSet<&str> = local.iter().map(|r| r.id.as_str()).collect();
        let mut pulled = 0usize;

        for row in rows {
            let Some(id) = remote_id(config, row) else {
                report.errors.push(RecordError::new(
                    "<unknown>",
                    format!("row in {} is missing its primary key", config.remote_table),
                ));
                continue;
            };
            if local_ids.contains(id.as_str()) {
                continue;
            }
            match to_local(config, row) {
                Ok(record) => {
                    self.store.upsert(&config.local_key, record);
                    pulled += 1;
                }
                Err(err) => report.errors.push(RecordError::new(id.as_str(), err.to_string())),
            }
        }

        pulled
    }

    /// Detects and resolves conflicts for ids present on both sides.
    ///
    /// Returns the number of auto-resolved conflicts. Resolved values are
    /// written to whichever side is stale; `Manual` leftovers are queued.
    async fn reconcile(
        &self,
        config: &CollectionConfig,
        local: &[Record],
        remote_index: &HashMap<String, &RemoteRecord>,
        report: &mut SyncReport,
    ) -> EngineResult<usize> {
        let mut auto_resolved_total = 0usize;

        for record in local {
            let Some(row) = remote_index.get(&record.id).copied() else {
                continue;
            };
            let remote_record = match to_local(config, row) {
                Ok(remote_record) => remote_record,
                Err(err) => {
                    report.errors.push(RecordError::new(record.id.as_str(), err.to_string()));
                    continue;
                }
            };

            let conflicts = match detect(
                config,
                &record.id,
                &Value::Object(record.fields.clone()),
                &Value::Object(remote_record.fields.clone()),
                record.updated_at,
                remote_record.updated_at,
            ) {
                Ok(conflicts) => conflicts,
                Err(err) => {
                    report.errors.push(RecordError::new(record.id.as_str(), err.to_string()));
                    continue;
                }
            };
            if conflicts.is_empty() {
                continue;
            }

            let outcome = auto_resolve(conflicts);
            auto_resolved_total += outcome.auto_resolved.len();

            let mut local_patch = record.clone();
            let mut remote_patch = remote_record.clone();
            let mut local_stale = false;
            let mut remote_stale = false;

            for resolved in &outcome.auto_resolved {
                match resolved.winner {
                    Side::Local => {
                        set_path(
                            &mut remote_patch.fields,
                            &resolved.conflict.field,
                            resolved.conflict.local_value.clone(),
                        );
                        remote_stale = true;
                    }
                    Side::Remote => {
                        set_path(
                            &mut local_patch.fields,
                            &resolved.conflict.field,
                            resolved.conflict.remote_value.clone(),
                        );
                        local_stale = true;
                    }
                }
            }

            for conflict in outcome.requires_manual {
                match config.resolution_strategy.resolve(&conflict) {
                    Resolution::UseLocal => {
                        set_path(
                            &mut remote_patch.fields,
                            &conflict.field,
                            conflict.local_value.clone(),
                        );
                        remote_stale = true;
                    }
                    Resolution::UseRemote => {
                        set_path(
                            &mut local_patch.fields,
                            &conflict.field,
                            conflict.remote_value.clone(),
                        );
                        local_stale = true;
                    }
                    Resolution::Defer => {
                        debug!(collection = %config.name, record_id = %conflict.record_id, field = %conflict.field, "conflict queued for manual resolution");
                        self.queue.push(&config.name, conflict.clone());
                        report.conflicts.push(conflict);
                    }
                }
            }

            if local_stale {
                local_patch.touch();
                self.store.upsert(&config.local_key, local_patch);
                report.synced += 1;
            }
            if remote_stale {
                remote_patch.touch();
                let row = to_remote(config, &remote_patch);
                match with_retry(&self.config.retry, || {
                    self.remote.upsert(&config.remote_table, &row)
                })
                .await
                {
                    Ok(()) => report.synced += 1,
                    Err(err) if err.is_connectivity() => return Err(err),
                    Err(err) => {
                        report.errors.push(RecordError::new(record.id.as_str(), err.to_string()));
                    }
                }
            }
        }

        Ok(auto_resolved_total)
    }

    /// Syncs every configured collection in name order. One collection's
    /// failure never aborts the others.
    pub async fn sync_all(
        &self,
        direction: SyncDirection,
    ) -> Vec<(String, EngineResult<SyncReport>)> {
        let mut names: Vec<&String> = self.collections.keys().collect();
        names.sort();

        let mut results = Vec::with_capacity(names.len());
        for name in names {
            let result = self.sync_collection(name, direction).await;
            results.push((name.clone(), result));
        }
        results
    }

    /// Applies a manual resolution request against the queue.
    ///
    /// Each field resolution is applied only if its conflict is still
    /// queued (remove-if-present), so a request racing a later sync pass
    /// cannot double-resolve a superseded conflict. Both stores converge on
    /// the chosen value. Returns the number of resolutions applied.
    pub async fn apply_resolution(
        &self,
        collection: &str,
        request: &ResolutionRequest,
    ) -> EngineResult<usize> {
        let config = self
            .collections
            .get(collection)
            .ok_or_else(|| EngineError::UnknownCollection(collection.to_string()))?;

        let mut applied = 0usize;
        for resolution in &request.resolutions {
            if self
                .queue
                .take(collection, &request.record_id, &resolution.field)
                .is_none()
            {
                debug!(collection, record_id = %request.record_id, field = %resolution.field, "resolution skipped, conflict no longer queued");
                continue;
            }

            let mut record = self
                .store
                .get(&config.local_key, &request.record_id)
                .unwrap_or_else(|| Record::new(request.record_id.as_str(), serde_json::Map::new()));
            set_path(&mut record.fields, &resolution.field, resolution.value.clone());
            record.touch();
            self.store.upsert(&config.local_key, record.clone());

            let row = to_remote(config, &record);
            with_retry(&self.config.retry, || {
                self.remote.upsert(&config.remote_table, &row)
            })
            .await?;
            applied += 1;
        }

        if applied > 0
            && !self.queue.has_conflicts(collection)
            && self.status(collection) == SyncStatus::Conflict
        {
            self.set_status(collection, SyncStatus::Success);
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::error::RemoteErrorKind;
    use crate::remote::MockRemote;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};
    use duosync_protocol::ResolutionStrategy;
    use serde_json::{json, Map};
    use std::time::Duration;

    fn record(id: &str, name: &str) -> Record {
        let mut fields = Map::new();
        fields.insert("name".into(), json!(name));
        Record::new(id, fields).with_timestamps(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        )
    }

    fn engine_with(
        strategy: ResolutionStrategy,
    ) -> (SyncEngine<MemoryStore, MockRemote>, Arc<MemoryStore>, Arc<MockRemote>) {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(MockRemote::new());
        let config = EngineConfig::new().with_retry(RetryConfig::no_retry());
        let collections = vec![CollectionConfig::new("projects", "projects").with_strategy(strategy)];
        let engine = SyncEngine::new(
            config,
            collections,
            Arc::clone(&store),
            Arc::clone(&remote),
        )
        .unwrap();
        (engine, store, remote)
    }

    #[tokio::test]
    async fn unknown_collection_fails_fast() {
        let (engine, _store, _remote) = engine_with(ResolutionStrategy::ServerWins);
        let err = engine
            .sync_collection("missing", SyncDirection::Both)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownCollection(_)));
    }

    #[tokio::test]
    async fn duplicate_collections_are_rejected() {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(MockRemote::new());
        let result = SyncEngine::new(
            EngineConfig::new(),
            vec![
                CollectionConfig::new("projects", "a"),
                CollectionConfig::new("projects", "b"),
            ],
            store,
            remote,
        );
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn clean_push_uploads_missing_records() {
        let (engine, store, remote) = engine_with(ResolutionStrategy::ServerWins);
        store.upsert("projects", record("p1", "Acme"));

        let report = engine
            .sync_collection("projects", SyncDirection::Push)
            .await
            .unwrap();

        assert_eq!(report.synced, 1);
        assert!(report.errors.is_empty());
        assert_eq!(engine.status("projects"), SyncStatus::Success);

        let row = remote.row("projects", "p1").unwrap();
        assert_eq!(row.get("name"), Some(&json!("Acme")));
        assert_eq!(row.get("migrated_from_local"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn pull_appends_but_never_overwrites() {
        let (engine, store, remote) = engine_with(ResolutionStrategy::ServerWins);
        store.upsert("projects", record("p1", "Local"));

        remote.insert_row(
            "projects",
            to_remote(
                &CollectionConfig::new("projects", "projects"),
                &record("p1", "Remote"),
            ),
        );
        remote.insert_row(
            "projects",
            to_remote(
                &CollectionConfig::new("projects", "projects"),
                &record("p2", "New"),
            ),
        );

        let report = engine
            .sync_collection("projects", SyncDirection::Pull)
            .await
            .unwrap();

        assert_eq!(report.synced, 1);
        // The existing record keeps its local value; only p2 was appended.
        assert_eq!(store.get("projects", "p1").unwrap().field("name"), Some(&json!("Local")));
        assert_eq!(store.get("projects", "p2").unwrap().field("name"), Some(&json!("New")));
    }

    #[tokio::test]
    async fn disabled_engine_no_ops() {
        let (engine, store, _remote) = engine_with(ResolutionStrategy::ServerWins);
        store.upsert("projects", record("p1", "Acme"));
        engine.set_enabled(false);

        let report = engine
            .sync_collection("projects", SyncDirection::Push)
            .await
            .unwrap();
        assert!(report.no_op);
        assert_eq!(report.synced, 0);

        engine.set_enabled(true);
        let report = engine
            .sync_collection("projects", SyncDirection::Push)
            .await
            .unwrap();
        assert!(!report.no_op);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_sync_of_same_collection_no_ops() {
        let (engine, store, remote) = engine_with(ResolutionStrategy::ServerWins);
        store.upsert("projects", record("p1", "Acme"));
        remote.set_latency(Duration::from_millis(200));

        let engine = Arc::new(engine);
        let background = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.sync_collection("projects", SyncDirection::Push).await })
        };
        tokio::task::yield_now().await;

        let second = engine
            .sync_collection("projects", SyncDirection::Push)
            .await
            .unwrap();
        assert!(second.no_op);

        let first = background.await.unwrap().unwrap();
        assert!(!first.no_op);
        assert_eq!(first.synced, 1);
    }

    #[tokio::test]
    async fn collection_level_failure_sets_error_status() {
        let (engine, store, remote) = engine_with(ResolutionStrategy::ServerWins);
        store.upsert("projects", record("p1", "Acme"));
        remote.fail_next(RemoteErrorKind::Network, 1);

        let result = engine.sync_collection("projects", SyncDirection::Push).await;
        assert!(result.is_err());
        assert_eq!(engine.status("projects"), SyncStatus::Error);
        assert!(engine.stats().last_error.is_some());
    }

    #[tokio::test]
    async fn per_record_failure_does_not_abort_the_batch() {
        let (engine, store, remote) = engine_with(ResolutionStrategy::ServerWins);
        store.upsert("projects", record("p1", "Acme"));
        store.upsert("projects", record("p2", "Beta"));
        remote.reject_id("p1");

        let report = engine
            .sync_collection("projects", SyncDirection::Push)
            .await
            .unwrap();

        assert_eq!(report.synced, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].record_id, "p1");
        assert!(remote.row("projects", "p2").is_some());
        assert_eq!(engine.status("projects"), SyncStatus::Error);
    }

    #[tokio::test]
    async fn auto_resolution_fills_the_empty_side() {
        let (engine, store, remote) = engine_with(ResolutionStrategy::Manual);
        let config = CollectionConfig::new("projects", "projects");

        store.upsert("projects", record("p1", ""));
        remote.insert_row("projects", to_remote(&config, &record("p1", "Acme")));

        let report = engine
            .sync_collection("projects", SyncDirection::Both)
            .await
            .unwrap();

        assert!(report.conflicts.is_empty());
        assert_eq!(store.get("projects", "p1").unwrap().field("name"), Some(&json!("Acme")));
        assert_eq!(engine.stats().conflicts_auto_resolved, 1);
        assert_eq!(engine.status("projects"), SyncStatus::Success);
    }

    #[tokio::test]
    async fn manual_strategy_queues_non_empty_conflicts() {
        let (engine, store, remote) = engine_with(ResolutionStrategy::Manual);
        let config = CollectionConfig::new("projects", "projects");

        store.upsert("projects", record("p1", "Acme"));
        remote.insert_row("projects", to_remote(&config, &record("p1", "Acme Corp")));

        let report = engine
            .sync_collection("projects", SyncDirection::Both)
            .await
            .unwrap();

        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].field, "name");
        assert_eq!(engine.status("projects"), SyncStatus::Conflict);
        assert!(engine.queue().has_conflicts("projects"));
        // Neither side was clobbered while the conflict waits.
        assert_eq!(store.get("projects", "p1").unwrap().field("name"), Some(&json!("Acme")));
    }

    #[tokio::test]
    async fn latest_wins_takes_the_newer_side() {
        let (engine, store, remote) = engine_with(ResolutionStrategy::LatestWins);
        let config = CollectionConfig::new("projects", "projects");

        let mut local = record("p1", "Model A");
        local.updated_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        store.upsert("projects", local);

        let mut newer = record("p1", "Model B");
        newer.updated_at = Some(Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap());
        remote.insert_row("projects", to_remote(&config, &newer));

        engine
            .sync_collection("projects", SyncDirection::Both)
            .await
            .unwrap();

        assert_eq!(store.get("projects", "p1").unwrap().field("name"), Some(&json!("Model B")));
        assert_eq!(engine.status("projects"), SyncStatus::Success);
    }

    #[tokio::test]
    async fn local_wins_writes_back_to_the_remote() {
        let (engine, store, remote) = engine_with(ResolutionStrategy::LocalWins);
        let config = CollectionConfig::new("projects", "projects");

        store.upsert("projects", record("p1", "Local"));
        remote.insert_row("projects", to_remote(&config, &record("p1", "Remote")));

        engine
            .sync_collection("projects", SyncDirection::Both)
            .await
            .unwrap();

        let row = remote.row("projects", "p1").unwrap();
        assert_eq!(row.get("name"), Some(&json!("Local")));
    }

    #[tokio::test]
    async fn repeated_both_sync_is_idempotent() {
        let (engine, store, remote) = engine_with(ResolutionStrategy::LatestWins);
        let config = CollectionConfig::new("projects", "projects");

        store.upsert("projects", record("p1", "Model A"));
        remote.insert_row("projects", to_remote(&config, &record("p2", "Model B")));

        let first = engine
            .sync_collection("projects", SyncDirection::Both)
            .await
            .unwrap();
        assert_eq!(first.synced, 2);

        let second = engine
            .sync_collection("projects", SyncDirection::Both)
            .await
            .unwrap();
        assert_eq!(second.synced, 0);
        assert!(second.conflicts.is_empty());
        assert!(second.errors.is_empty());
    }

    #[tokio::test]
    async fn manual_resolution_converges_both_stores() {
        let (engine, store, remote) = engine_with(ResolutionStrategy::Manual);
        let config = CollectionConfig::new("projects", "projects");

        store.upsert("projects", record("p1", "Acme"));
        remote.insert_row("projects", to_remote(&config, &record("p1", "Acme Corp")));
        engine
            .sync_collection("projects", SyncDirection::Both)
            .await
            .unwrap();
        assert_eq!(engine.status("projects"), SyncStatus::Conflict);

        let request = ResolutionRequest {
            record_id: "p1".into(),
            resolutions: vec![duosync_protocol::FieldResolution {
                field: "name".into(),
                chosen_side: Side::Remote,
                value: json!("Acme Corp"),
            }],
        };
        let applied = engine.apply_resolution("projects", &request).await.unwrap();
        assert_eq!(applied, 1);

        assert_eq!(store.get("projects", "p1").unwrap().field("name"), Some(&json!("Acme Corp")));
        assert_eq!(
            remote.row("projects", "p1").unwrap().get("name"),
            Some(&json!("Acme Corp"))
        );
        assert_eq!(engine.status("projects"), SyncStatus::Success);

        // The queue entry is gone; replaying the request applies nothing.
        let replay = engine.apply_resolution("projects", &request).await.unwrap();
        assert_eq!(replay, 0);
    }

    #[tokio::test]
    async fn sync_all_covers_every_collection() {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(MockRemote::new());
        let engine = SyncEngine::new(
            EngineConfig::new().with_retry(RetryConfig::no_retry()),
            vec![
                CollectionConfig::new("opinions", "opinions"),
                CollectionConfig::new("projects", "projects"),
            ],
            Arc::clone(&store),
            Arc::clone(&remote),
        )
        .unwrap();

        store.upsert("projects", record("p1", "Acme"));
        store.upsert("opinions", record("o1", "Fine"));

        let results = engine.sync_all(SyncDirection::Both).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, result)| result.is_ok()));
        assert_eq!(engine.stats().runs_completed, 2);
        assert!(remote.row("projects", "p1").is_some());
        assert!(remote.row("opinions", "o1").is_some());
    }
}
