use crate::pool::{
    Heartbeat, LogHeartbeat, PoolConfig, StopSignal, Task, TaskContext, TaskOutcome, TaskPool,
};
use crate::Result;
use async_trait::async_trait;
use docsync_store::{CollectionKind, ObjectKey, ObjectStore, DEFAULT_LIST_PAGE_SIZE};
use std::sync::Arc;
use std::time::Duration;

/// Per-object callback driven by [`CollectionScanner`].
#[async_trait]
pub trait ScanHandler: Send + Sync {
    async fn handle(&self, key: &ObjectKey) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub list_page_size: usize,
    pub poll_interval: Duration,
    /// Bounded queue size; `None` means `workers * 4`.
    pub queue_capacity: Option<usize>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
            poll_interval: crate::pool::DEFAULT_POLL_INTERVAL,
            queue_capacity: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub outcome: TaskOutcome,
    pub keys_seen: u64,
    pub keys_processed: u64,
}

impl ScanReport {
    /// Every key of the kind was listed and handled.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Walks every object of one kind through a handler on a [`TaskPool`].
pub struct CollectionScanner {
    store: Arc<dyn ObjectStore>,
    config: ScanConfig,
    stop: StopSignal,
}

impl CollectionScanner {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            config: ScanConfig::default(),
            stop: StopSignal::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// `false` means the kind may not have been fully scanned.
    pub async fn scan(
        &self,
        kind: &CollectionKind,
        handler: Arc<dyn ScanHandler>,
        workers: usize,
    ) -> bool {
        self.scan_with_report(kind, handler, workers)
            .await
            .is_complete()
    }

    pub async fn scan_with_report(
        &self,
        kind: &CollectionKind,
        handler: Arc<dyn ScanHandler>,
        workers: usize,
    ) -> ScanReport {
        let heartbeat = LogHeartbeat::new(format!("scan {kind}"));
        self.scan_with_heartbeat(kind, handler, workers, &heartbeat)
            .await
    }

    pub async fn scan_with_heartbeat(
        &self,
        kind: &CollectionKind,
        handler: Arc<dyn ScanHandler>,
        workers: usize,
        heartbeat: &dyn Heartbeat,
    ) -> ScanReport {
        let mut pool_config =
            PoolConfig::new(workers).with_poll_interval(self.config.poll_interval);
        if let Some(capacity) = self.config.queue_capacity {
            pool_config = pool_config.with_queue_capacity(capacity);
        }

        let lister = ListKeys {
            store: self.store.clone(),
            kind: kind.clone(),
            page_size: self.config.list_page_size.max(1),
            handler,
        };
        let report = TaskPool::new(pool_config)
            .with_stop_signal(self.stop.clone())
            .run(Box::new(lister), heartbeat)
            .await;

        log::debug!(
            "Scan of {kind} finished: {:?}, {} seen, {} processed",
            report.outcome,
            report.progress.items_seen,
            report.progress.items_processed
        );
        ScanReport {
            outcome: report.outcome,
            keys_seen: report.progress.items_seen,
            keys_processed: report.progress.items_processed,
        }
    }
}

struct ListKeys {
    store: Arc<dyn ObjectStore>,
    kind: CollectionKind,
    page_size: usize,
    handler: Arc<dyn ScanHandler>,
}

#[async_trait]
impl Task for ListKeys {
    fn name(&self) -> String {
        format!("list {}", self.kind)
    }

    async fn run(self: Box<Self>, ctx: TaskContext) -> Result<TaskOutcome> {
        let mut cursor: Option<String> = None;
        loop {
            if ctx.should_stop() {
                return Ok(TaskOutcome::Stopped);
            }
            let page = self
                .store
                .list_page(&self.kind, cursor.as_deref(), self.page_size)
                .await?;
            ctx.record_seen(page.keys.len() as u64);
            for key in page.keys {
                let task = ProcessKey {
                    key,
                    handler: self.handler.clone(),
                };
                if !ctx.submit(Box::new(task)).await {
                    return Ok(TaskOutcome::Stopped);
                }
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(TaskOutcome::Success),
            }
        }
    }
}

struct ProcessKey {
    key: ObjectKey,
    handler: Arc<dyn ScanHandler>,
}

#[async_trait]
impl Task for ProcessKey {
    fn name(&self) -> String {
        self.key.path()
    }

    async fn run(self: Box<Self>, ctx: TaskContext) -> Result<TaskOutcome> {
        self.handler.handle(&self.key).await?;
        ctx.record_processed(1);
        Ok(TaskOutcome::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IndexerError;
    use docsync_store::MemoryObjectStore;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    struct Collect {
        seen: Mutex<BTreeSet<String>>,
        fail_on: Option<String>,
        stop_on: Option<(String, StopSignal)>,
    }

    impl Collect {
        fn new() -> Self {
            Self {
                seen: Mutex::new(BTreeSet::new()),
                fail_on: None,
                stop_on: None,
            }
        }
    }

    #[async_trait]
    impl ScanHandler for Collect {
        async fn handle(&self, key: &ObjectKey) -> Result<()> {
            if self.fail_on.as_deref() == Some(key.id()) {
                return Err(IndexerError::Other(format!("cannot handle {key}")));
            }
            if let Some((id, stop)) = &self.stop_on {
                if id == key.id() {
                    stop.stop();
                }
            }
            self.seen.lock().unwrap().insert(key.id().to_string());
            Ok(())
        }
    }

    async fn seeded(count: usize) -> (Arc<MemoryObjectStore>, CollectionKind) {
        let store = Arc::new(MemoryObjectStore::new());
        let kind = CollectionKind::new("books").unwrap();
        for i in 0..count {
            let key = ObjectKey::new(kind.clone(), format!("b{i:04}"), "json").unwrap();
            store.put(&key, b"{}".to_vec()).await.unwrap();
        }
        (store, kind)
    }

    fn small_pages() -> ScanConfig {
        ScanConfig {
            list_page_size: 7,
            poll_interval: Duration::from_millis(5),
            queue_capacity: Some(4),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn scan_visits_every_key_across_pages() {
        let (store, kind) = seeded(50).await;
        let handler = Arc::new(Collect::new());
        let scanner = CollectionScanner::new(store).with_config(small_pages());

        let report = scanner.scan_with_report(&kind, handler.clone(), 3).await;
        assert!(report.is_complete());
        assert_eq!(report.keys_seen, 50);
        assert_eq!(report.keys_processed, 50);
        assert_eq!(handler.seen.lock().unwrap().len(), 50);
    }

    #[tokio::test]
    async fn empty_kind_is_a_complete_scan() {
        let (store, kind) = seeded(0).await;
        let scanner = CollectionScanner::new(store).with_config(small_pages());
        assert!(scanner.scan(&kind, Arc::new(Collect::new()), 2).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn handler_failure_makes_scan_incomplete() {
        let (store, kind) = seeded(20).await;
        let mut handler = Collect::new();
        handler.fail_on = Some("b0011".to_string());
        let handler = Arc::new(handler);
        let scanner = CollectionScanner::new(store).with_config(small_pages());

        let report = scanner.scan_with_report(&kind, handler.clone(), 2).await;
        assert_eq!(report.outcome, TaskOutcome::Error);
        assert_eq!(report.keys_processed, 19);
    }

    #[tokio::test]
    async fn listing_failure_returns_false() {
        let (store, kind) = seeded(5).await;
        store.set_list_failure(true);
        let scanner = CollectionScanner::new(store).with_config(small_pages());
        assert!(!scanner.scan(&kind, Arc::new(Collect::new()), 2).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stop_signal_cancels_scan() {
        let (store, kind) = seeded(300).await;
        let stop = StopSignal::new();
        let mut handler = Collect::new();
        handler.stop_on = Some(("b0003".to_string(), stop.clone()));
        let handler = Arc::new(handler);
        let scanner = CollectionScanner::new(store)
            .with_config(small_pages())
            .with_stop_signal(stop);

        let report = scanner.scan_with_report(&kind, handler.clone(), 2).await;
        assert_eq!(report.outcome, TaskOutcome::Stopped);
        assert!(handler.seen.lock().unwrap().len() < 300);
    }
}
