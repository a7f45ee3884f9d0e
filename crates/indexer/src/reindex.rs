//! Zero-downtime rebuild of one collection's search index.
//!
//! ```text
//! CreateGeneration ──> Backfill ──> SwapAlias ──> CleanupOldGenerations ──> Done
//!        │                │             │
//!        └────────────────┴─────────────┴──> Failed (new generation deleted)
//! ```
//!
//! Queries keep reading the previous generation through the alias until the
//! swap, which is a single atomic alias request.

use crate::job::{JobState, ReindexJob, ReindexReport};
use crate::pool::{LogHeartbeat, StopSignal};
use crate::reconcile::{Reconciler, DEFAULT_RECONCILE_PAGE_SIZE};
use crate::record::RecordCodec;
use crate::registry::CollectionRegistration;
use crate::scanner::{CollectionScanner, ScanConfig, ScanHandler};
use crate::{IndexerError, Result};
use async_trait::async_trait;
use docsync_search::{IndexGeneration, SearchBackend, SearchDocument, SearchError};
use docsync_store::{ObjectKey, ObjectStore, StoreError};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

pub const DEFAULT_BULK_BATCH_SIZE: usize = 500;
pub const DEFAULT_REINDEX_WORKERS: usize = 8;

/// Attempts to delete a generation that must not survive a failed run.
pub const DEFAULT_DELETE_TIMEOUTS: [Duration; 5] = [
    Duration::from_secs(120),
    Duration::from_secs(180),
    Duration::from_secs(240),
    Duration::from_secs(300),
    Duration::from_secs(360),
];

const MAX_NAME_ATTEMPTS: usize = 64;

#[derive(Debug, Clone)]
pub struct ReindexConfig {
    pub workers: usize,
    pub bulk_batch_size: usize,
    pub reconcile_page_size: usize,
    pub delete_timeouts: Vec<Duration>,
    pub scan: ScanConfig,
}

impl Default for ReindexConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_REINDEX_WORKERS,
            bulk_batch_size: DEFAULT_BULK_BATCH_SIZE,
            reconcile_page_size: DEFAULT_RECONCILE_PAGE_SIZE,
            delete_timeouts: DEFAULT_DELETE_TIMEOUTS.to_vec(),
            scan: ScanConfig::default(),
        }
    }
}

pub struct Reindexer {
    store: Arc<dyn ObjectStore>,
    search: Arc<dyn SearchBackend>,
    config: ReindexConfig,
    stop: StopSignal,
}

impl Reindexer {
    pub fn new(store: Arc<dyn ObjectStore>, search: Arc<dyn SearchBackend>) -> Self {
        Self {
            store,
            search,
            config: ReindexConfig::default(),
            stop: StopSignal::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ReindexConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    #[must_use]
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Rebuild the collection's index. Never fails: the outcome is in the report.
    pub async fn reindex(&self, registration: &CollectionRegistration) -> ReindexReport {
        let started = Instant::now();
        let alias = registration.alias();
        let mut report = ReindexReport::new(registration.kind.as_str(), alias.as_str());
        let mut job = ReindexJob::new();

        log::info!("Reindexing {} into {alias}", registration.kind);
        if let Err(err) = self.run_job(registration, &mut job, &mut report).await {
            log::error!(
                "Reindex of {} failed in {:?}: {err}",
                registration.kind,
                job.state()
            );
            if !job.state().is_terminal() {
                let _ = job.fail();
            }
            report.error = Some(err.to_string());
        }

        report.state = job.state();
        report.history = job.history().to_vec();
        report.duration_ms = started.elapsed().as_millis() as u64;
        if report.succeeded() {
            log::info!(
                "Reindexed {} into {}: {} documents, {} skipped ({}ms)",
                registration.kind,
                report.generation.as_deref().unwrap_or_default(),
                report.documents_indexed,
                report.skipped,
                report.duration_ms
            );
        }
        report
    }

    async fn run_job(
        &self,
        registration: &CollectionRegistration,
        job: &mut ReindexJob,
        report: &mut ReindexReport,
    ) -> Result<()> {
        self.ensure_running(JobState::CreateGeneration)?;
        let generation = self.create_generation(registration).await?;
        report.generation = Some(generation.name().to_string());

        let previous = match self
            .build_and_swap(registration, &generation, job, report)
            .await
        {
            Ok(previous) => previous,
            Err(err) => {
                if !self.delete_generation_with_retry(generation.name()).await {
                    report.orphaned_generation = Some(generation.name().to_string());
                }
                return Err(err);
            }
        };

        // The alias now serves the new generation; the run completes from here.
        job.advance(JobState::CleanupOldGenerations)?;
        report.removed_generations = self.cleanup(registration, &generation, &previous).await;

        job.advance(JobState::Done)?;
        if self.stop.is_stopped() {
            log::info!("Skipping reconcile of {}: stop requested", registration.kind);
            return Ok(());
        }
        let reconciler = Reconciler::new(self.store.clone(), self.search.clone())
            .with_page_size(self.config.reconcile_page_size);
        match reconciler.reconcile(registration).await {
            Ok(reconcile) => report.reconcile = Some(reconcile),
            Err(err) => {
                log::warn!("Reconcile after reindex of {} failed: {err}", registration.kind);
                report.error = Some(format!("reconcile failed: {err}"));
            }
        }
        Ok(())
    }

    /// Backfill the new generation and point the alias at it.
    ///
    /// Returns the indices the alias served before the swap.
    async fn build_and_swap(
        &self,
        registration: &CollectionRegistration,
        generation: &IndexGeneration,
        job: &mut ReindexJob,
        report: &mut ReindexReport,
    ) -> Result<BTreeSet<String>> {
        self.enter(job, JobState::Backfill)?;
        self.backfill(registration, generation, report).await?;

        self.enter(job, JobState::SwapAlias)?;
        let alias = registration.alias();
        let previous = self.search.alias_targets(&alias).await?;
        let remove: Vec<String> = previous
            .iter()
            .filter(|name| name.as_str() != generation.name())
            .cloned()
            .collect();
        self.search
            .swap_alias(&alias, generation.name(), &remove)
            .await?;
        log::info!(
            "Alias {alias} -> {} (detached {})",
            generation.name(),
            if remove.is_empty() {
                "nothing".to_string()
            } else {
                remove.join(", ")
            }
        );
        Ok(previous)
    }

    fn ensure_running(&self, next: JobState) -> Result<()> {
        if self.stop.is_stopped() {
            return Err(IndexerError::Cancelled(format!("{next:?}")));
        }
        Ok(())
    }

    fn enter(&self, job: &mut ReindexJob, next: JobState) -> Result<()> {
        self.ensure_running(next)?;
        job.advance(next)
    }

    async fn create_generation(
        &self,
        registration: &CollectionRegistration,
    ) -> Result<IndexGeneration> {
        let identity = &registration.identity;
        let mut generation = IndexGeneration::new(identity, unix_now_ms());
        for _ in 0..MAX_NAME_ATTEMPTS {
            if self.search.index_exists(generation.name()).await? {
                generation = generation.bump(identity);
                continue;
            }
            match self
                .search
                .create_index(generation.name(), &registration.mapping)
                .await
            {
                Ok(()) => {
                    log::debug!("Created generation {generation}");
                    return Ok(generation);
                }
                Err(SearchError::IndexAlreadyExists(_)) => generation = generation.bump(identity),
                Err(err) => return Err(err.into()),
            }
        }
        Err(IndexerError::Other(format!(
            "no free generation name for {identity} after {MAX_NAME_ATTEMPTS} attempts"
        )))
    }

    async fn backfill(
        &self,
        registration: &CollectionRegistration,
        generation: &IndexGeneration,
        report: &mut ReindexReport,
    ) -> Result<()> {
        let handler = Arc::new(BackfillHandler {
            store: self.store.clone(),
            search: self.search.clone(),
            codec: registration.codec.clone(),
            index: generation.name().to_string(),
            batch_size: self.config.bulk_batch_size.max(1),
            buffer: Mutex::new(Vec::new()),
            indexed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        });

        let scanner = CollectionScanner::new(self.store.clone())
            .with_config(self.config.scan.clone())
            .with_stop_signal(self.stop.clone());
        let heartbeat = LogHeartbeat::new(format!("backfill {}", registration.kind));
        let scan = scanner
            .scan_with_heartbeat(
                &registration.kind,
                handler.clone(),
                self.config.workers,
                &heartbeat,
            )
            .await;

        // Flush even after a failed scan so the counters reflect what was written.
        let flushed = handler.flush().await;
        report.keys_seen = scan.keys_seen;
        report.documents_indexed = handler.indexed.load(Ordering::SeqCst);
        report.skipped = handler.skipped.load(Ordering::SeqCst);

        if !scan.is_complete() {
            return Err(IndexerError::Other(format!(
                "backfill of {} incomplete ({:?})",
                registration.kind, scan.outcome
            )));
        }
        flushed?;
        if report.documents_indexed == 0 {
            return Err(IndexerError::Other(format!(
                "backfill of {} wrote no documents",
                registration.kind
            )));
        }
        Ok(())
    }

    /// Best-effort removal of the previous targets and stale generations.
    async fn cleanup(
        &self,
        registration: &CollectionRegistration,
        generation: &IndexGeneration,
        previous: &BTreeSet<String>,
    ) -> Vec<String> {
        let identity = &registration.identity;
        let mut candidates: BTreeSet<String> = previous
            .iter()
            .filter(|name| name.as_str() != generation.name())
            .cloned()
            .collect();
        match self.search.list_indices(&identity.generation_prefix()).await {
            Ok(names) => candidates.extend(names.into_iter().filter(|name| {
                name != generation.name() && IndexGeneration::parse(identity, name).is_some()
            })),
            Err(err) => log::warn!("Cannot list generations of {identity}: {err}"),
        }

        let bound = match self.search.alias_targets(&identity.alias()).await {
            Ok(bound) => bound,
            Err(err) => {
                log::warn!("Skipping cleanup of {identity}: cannot read alias: {err}");
                return Vec::new();
            }
        };
        let timeout = self
            .config
            .delete_timeouts
            .first()
            .copied()
            .unwrap_or(DEFAULT_DELETE_TIMEOUTS[0]);

        let mut removed = Vec::new();
        for name in candidates {
            if bound.contains(&name) {
                continue;
            }
            match self.search.delete_index(&name, timeout).await {
                Ok(()) | Err(SearchError::IndexNotFound(_)) => {
                    log::info!("Removed old generation {name}");
                    removed.push(name);
                }
                Err(err) => log::warn!("Could not remove old generation {name}: {err}"),
            }
        }
        removed
    }

    /// Returns `false` when the index is orphaned and needs manual cleanup.
    async fn delete_generation_with_retry(&self, name: &str) -> bool {
        let attempts = self.config.delete_timeouts.len();
        for (attempt, timeout) in self.config.delete_timeouts.iter().enumerate() {
            match self.search.delete_index(name, *timeout).await {
                Ok(()) | Err(SearchError::IndexNotFound(_)) => {
                    log::info!("Deleted unfinished generation {name}");
                    return true;
                }
                Err(err) => log::warn!(
                    "Attempt {}/{attempts} to delete generation {name} failed: {err}",
                    attempt + 1
                ),
            }
        }
        log::error!("Generation {name} is orphaned; delete it manually");
        false
    }
}

struct BackfillHandler {
    store: Arc<dyn ObjectStore>,
    search: Arc<dyn SearchBackend>,
    codec: Arc<dyn RecordCodec>,
    index: String,
    batch_size: usize,
    buffer: Mutex<Vec<SearchDocument>>,
    indexed: AtomicU64,
    skipped: AtomicU64,
}

impl BackfillHandler {
    async fn write(&self, batch: Vec<SearchDocument>) -> Result<()> {
        let requested = batch.len();
        let summary = self.search.bulk_index(&self.index, batch).await?;
        self.indexed
            .fetch_add(summary.indexed as u64, Ordering::SeqCst);
        if let Some(first) = summary.failures.first() {
            return Err(IndexerError::Other(format!(
                "bulk write to {} rejected {} of {requested} documents (first {}: {})",
                self.index,
                summary.failures.len(),
                first.id,
                first.reason
            )));
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let batch = std::mem::take(&mut *self.buffer.lock().await);
        if batch.is_empty() {
            return Ok(());
        }
        self.write(batch).await
    }
}

#[async_trait]
impl ScanHandler for BackfillHandler {
    async fn handle(&self, key: &ObjectKey) -> Result<()> {
        let bytes = match self.store.get(key).await {
            Ok(bytes) => bytes,
            Err(StoreError::NotFound(_)) => {
                log::debug!("{key} disappeared during backfill");
                self.skipped.fetch_add(1, Ordering::SeqCst);
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        let record = match self.codec.decode(key, &bytes) {
            Ok(record) => record,
            Err(err) => {
                log::warn!("Skipping {key}: {err}");
                self.skipped.fetch_add(1, Ordering::SeqCst);
                return Ok(());
            }
        };

        let full = {
            let mut buffer = self.buffer.lock().await;
            buffer.push(record.to_document());
            if buffer.len() >= self.batch_size {
                Some(std::mem::take(&mut *buffer))
            } else {
                None
            }
        };
        match full {
            Some(batch) => self.write(batch).await,
            None => Ok(()),
        }
    }
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_search::{FieldType, IndexIdentity, IndexMapping, MemorySearchBackend, SearchQuery};
    use docsync_store::{CollectionKind, MemoryObjectStore};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const ALIAS: &str = "library:patron:v1";

    fn registration() -> CollectionRegistration {
        CollectionRegistration::json(
            CollectionKind::new("patron").unwrap(),
            IndexIdentity::new("library", "patron", "v1").unwrap(),
            "json",
            IndexMapping::new().with_field("name", FieldType::Text),
        )
    }

    fn config() -> ReindexConfig {
        ReindexConfig {
            workers: 3,
            bulk_batch_size: 4,
            reconcile_page_size: 3,
            delete_timeouts: vec![Duration::from_millis(50); 3],
            scan: ScanConfig {
                list_page_size: 5,
                poll_interval: Duration::from_millis(5),
                queue_capacity: None,
            },
        }
    }

    async fn store_with(ids: &[&str]) -> Arc<MemoryObjectStore> {
        let store = Arc::new(MemoryObjectStore::new());
        let kind = CollectionKind::new("patron").unwrap();
        for id in ids {
            let key = ObjectKey::new(kind.clone(), *id, "json").unwrap();
            let body = serde_json::to_vec(&json!({ "id": id, "name": format!("Patron {id}") }))
                .unwrap();
            store.put(&key, body).await.unwrap();
        }
        store
    }

    fn reindexer(store: &Arc<MemoryObjectStore>, search: &Arc<MemorySearchBackend>) -> Reindexer {
        Reindexer::new(store.clone(), search.clone()).with_config(config())
    }

    async fn alias_total(search: &MemorySearchBackend) -> u64 {
        search
            .query(ALIAS, &SearchQuery::match_all(100))
            .await
            .unwrap()
            .total
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn first_reindex_binds_alias_to_new_generation() {
        let ids: Vec<String> = (0..13).map(|i| format!("p{i:02}")).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let store = store_with(&refs).await;
        let search = Arc::new(MemorySearchBackend::new());

        let report = reindexer(&store, &search).reindex(&registration()).await;
        assert!(report.succeeded(), "{report:?}");
        assert_eq!(report.documents_indexed, 13);
        assert_eq!(report.keys_seen, 13);
        assert_eq!(
            report.history,
            vec![
                JobState::CreateGeneration,
                JobState::Backfill,
                JobState::SwapAlias,
                JobState::CleanupOldGenerations,
                JobState::Done,
            ]
        );
        let generation = report.generation.clone().unwrap();
        assert!(generation.starts_with("library:patron:v1_"));
        assert_eq!(
            search.alias_targets(ALIAS).await.unwrap(),
            BTreeSet::from([generation])
        );
        assert_eq!(alias_total(&search).await, 13);
        assert_eq!(report.reconcile.unwrap().deleted, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn second_reindex_replaces_and_removes_previous_generation() {
        let store = store_with(&["a", "b"]).await;
        let search = Arc::new(MemorySearchBackend::new());
        let first = reindexer(&store, &search).reindex(&registration()).await;
        let second = reindexer(&store, &search).reindex(&registration()).await;
        assert!(second.succeeded());

        let old = first.generation.unwrap();
        let new = second.generation.unwrap();
        assert_ne!(old, new);
        assert_eq!(second.removed_generations, vec![old.clone()]);
        assert!(!search.index_exists(&old).await.unwrap());
        assert_eq!(search.alias_targets(ALIAS).await.unwrap(), BTreeSet::from([new]));
    }

    #[tokio::test]
    async fn taken_generation_name_is_bumped() {
        let search = MemorySearchBackend::new();
        let store = Arc::new(MemoryObjectStore::new());
        let registration = registration();
        let now = unix_now_ms();
        for offset in 0..3 {
            let taken = IndexGeneration::new(&registration.identity, now + offset);
            search.create_index(taken.name(), &IndexMapping::new()).await.unwrap();
        }
        let search = Arc::new(search);
        let generation = reindexer(&store, &search)
            .create_generation(&registration)
            .await
            .unwrap();
        assert!(generation.created_at_ms() >= now + 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn malformed_objects_are_skipped() {
        let store = store_with(&["a", "b"]).await;
        let kind = CollectionKind::new("patron").unwrap();
        store
            .put(&ObjectKey::new(kind.clone(), "broken", "json").unwrap(), b"{oops".to_vec())
            .await
            .unwrap();
        store
            .put(&ObjectKey::new(kind, "bare", "json").unwrap(), b"{\"x\":1}".to_vec())
            .await
            .unwrap();
        let search = Arc::new(MemorySearchBackend::new());

        let report = reindexer(&store, &search).reindex(&registration()).await;
        assert!(report.succeeded());
        assert_eq!(report.keys_seen, 4);
        assert_eq!(report.documents_indexed, 2);
        assert_eq!(report.skipped, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn backfill_failure_rolls_back_and_keeps_old_alias() {
        let store = store_with(&["a", "b", "c"]).await;
        let search = Arc::new(MemorySearchBackend::new());
        let first = reindexer(&store, &search).reindex(&registration()).await;
        let live = first.generation.unwrap();

        store.fail_get_for("b");
        let report = reindexer(&store, &search).reindex(&registration()).await;
        assert_eq!(report.state, JobState::Failed);
        assert!(report.error.is_some());
        assert_eq!(report.orphaned_generation, None);

        let failed = report.generation.unwrap();
        assert!(!search.index_exists(&failed).await.unwrap());
        assert_eq!(search.alias_targets(ALIAS).await.unwrap(), BTreeSet::from([live]));
        assert_eq!(alias_total(&search).await, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn empty_collection_fails_backfill() {
        let store = Arc::new(MemoryObjectStore::new());
        let search = Arc::new(MemorySearchBackend::new());
        let report = reindexer(&store, &search).reindex(&registration()).await;
        assert_eq!(report.state, JobState::Failed);
        assert!(search.index_names().is_empty());
        assert!(search.alias_targets(ALIAS).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn partial_bulk_failure_fails_the_run() {
        let store = store_with(&["a", "b", "c"]).await;
        let search = Arc::new(MemorySearchBackend::new());
        search.fail_bulk_item("c");
        let report = reindexer(&store, &search).reindex(&registration()).await;
        assert_eq!(report.state, JobState::Failed);
        assert!(search.index_names().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn swap_failure_deletes_new_generation() {
        let store = store_with(&["a"]).await;
        let search = Arc::new(MemorySearchBackend::new());
        search.set_alias_update_failure(true);
        let report = reindexer(&store, &search).reindex(&registration()).await;
        assert_eq!(report.state, JobState::Failed);
        assert_eq!(
            report.history.last().copied(),
            Some(JobState::Failed)
        );
        assert!(report.history.contains(&JobState::SwapAlias));
        assert!(search.index_names().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn rollback_retries_then_reports_orphan() {
        let store = Arc::new(MemoryObjectStore::new());
        let search = Arc::new(MemorySearchBackend::new());

        // Two failures then success.
        search.fail_next_index_deletions(2);
        let report = reindexer(&store, &search).reindex(&registration()).await;
        assert_eq!(report.orphaned_generation, None);
        assert!(search.index_names().is_empty());

        // More failures than attempts.
        search.fail_next_index_deletions(10);
        let report = reindexer(&store, &search).reindex(&registration()).await;
        assert_eq!(report.state, JobState::Failed);
        assert_eq!(report.orphaned_generation, report.generation);
        assert_eq!(search.index_names().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cleanup_removes_leftover_generations_of_earlier_runs() {
        let store = store_with(&["a"]).await;
        let search = Arc::new(MemorySearchBackend::new());
        let registration = registration();
        let leftover = IndexGeneration::new(&registration.identity, 42);
        search
            .create_index(leftover.name(), &IndexMapping::new())
            .await
            .unwrap();
        search
            .create_index("library:patron:v1_backup", &IndexMapping::new())
            .await
            .unwrap();

        let report = reindexer(&store, &search).reindex(&registration).await;
        assert!(report.succeeded());
        assert_eq!(report.removed_generations, vec![leftover.name().to_string()]);
        assert!(search.index_exists("library:patron:v1_backup").await.unwrap());
    }

    /// Raises the stop signal on the first object read.
    struct StopOnRead {
        inner: Arc<MemoryObjectStore>,
        stop: StopSignal,
    }

    #[async_trait]
    impl ObjectStore for StopOnRead {
        async fn put(&self, key: &ObjectKey, bytes: Vec<u8>) -> docsync_store::Result<()> {
            self.inner.put(key, bytes).await
        }

        async fn get(&self, key: &ObjectKey) -> docsync_store::Result<Vec<u8>> {
            self.stop.stop();
            self.inner.get(key).await
        }

        async fn exists(&self, key: &ObjectKey) -> docsync_store::Result<bool> {
            self.inner.exists(key).await
        }

        async fn delete(&self, key: &ObjectKey) -> docsync_store::Result<bool> {
            self.inner.delete(key).await
        }

        async fn list_page(
            &self,
            kind: &CollectionKind,
            cursor: Option<&str>,
            limit: usize,
        ) -> docsync_store::Result<docsync_store::KeyPage> {
            self.inner.list_page(kind, cursor, limit).await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stop_during_backfill_rolls_back_and_keeps_alias() {
        let ids: Vec<String> = (0..20).map(|i| format!("p{i:02}")).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let store = store_with(&refs).await;
        let search = Arc::new(MemorySearchBackend::new());
        let live = reindexer(&store, &search)
            .reindex(&registration())
            .await
            .generation
            .unwrap();

        let stop = StopSignal::new();
        let stopping = Arc::new(StopOnRead {
            inner: store.clone(),
            stop: stop.clone(),
        });
        let report = Reindexer::new(stopping, search.clone())
            .with_config(config())
            .with_stop_signal(stop.clone())
            .reindex(&registration())
            .await;

        assert!(stop.is_stopped());
        assert_eq!(report.state, JobState::Failed);
        assert!(report.history.contains(&JobState::Backfill));
        assert!(!report.history.contains(&JobState::SwapAlias));
        assert_eq!(report.orphaned_generation, None);

        let stopped = report.generation.unwrap();
        assert_ne!(stopped, live);
        assert!(!search.index_exists(&stopped).await.unwrap());
        assert_eq!(search.index_names(), vec![live.clone()]);
        assert_eq!(search.alias_targets(ALIAS).await.unwrap(), BTreeSet::from([live]));
        assert_eq!(alias_total(&search).await, 20);
    }

    #[tokio::test]
    async fn raised_stop_signal_fails_before_creating_anything() {
        let store = store_with(&["a"]).await;
        let search = Arc::new(MemorySearchBackend::new());
        let stop = StopSignal::new();
        stop.stop();
        let report = reindexer(&store, &search)
            .with_stop_signal(stop)
            .reindex(&registration())
            .await;
        assert_eq!(report.state, JobState::Failed);
        assert_eq!(report.generation, None);
        assert!(search.index_names().is_empty());
    }
}
