use docsync_search::{SearchBackend, SearchDocument};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteRejected {
    #[error("write queue is full")]
    QueueFull,

    #[error("writer is shutting down")]
    ShuttingDown,
}

#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub shutdown_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WriterHealth {
    pub accepted: u64,
    pub completed: u64,
    pub failed: u64,
    pub rejected: u64,
    pub last_error: Option<String>,
    /// Unix millis of the last completed write.
    pub last_success_ms: Option<u64>,
    pub shutting_down: bool,
}

impl WriterHealth {
    /// Accepted writes not yet finished.
    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.accepted.saturating_sub(self.completed + self.failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ShutdownReport {
    /// Every accepted write finished before the timeout.
    pub drained: bool,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Debug)]
enum WriteOp {
    Upsert {
        target: String,
        document: SearchDocument,
    },
    Delete {
        target: String,
        id: String,
    },
}

impl WriteOp {
    fn describe(&self) -> String {
        match self {
            Self::Upsert { target, document } => format!("upsert {}/{}", target, document.id),
            Self::Delete { target, id } => format!("delete {target}/{id}"),
        }
    }
}

/// Fire-and-forget search writes drained by a fixed set of workers.
///
/// Callers never wait on the search engine: a write is either queued or
/// rejected immediately. Failures are logged and counted in
/// [`WriterHealth`], never returned.
#[derive(Clone)]
pub struct AsyncWriter {
    inner: Arc<AsyncWriterInner>,
}

struct AsyncWriterInner {
    queue: Mutex<Option<mpsc::Sender<WriteOp>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shared: Arc<WriterShared>,
    shutdown_timeout: Duration,
}

struct WriterShared {
    accepting: AtomicBool,
    accepted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    health_tx: watch::Sender<WriterHealth>,
    _health_guard: watch::Receiver<WriterHealth>,
}

impl WriterShared {
    fn publish(&self, last_error: Option<String>, success: bool) {
        self.health_tx.send_modify(|health| {
            health.accepted = self.accepted.load(Ordering::SeqCst);
            health.completed = self.completed.load(Ordering::SeqCst);
            health.failed = self.failed.load(Ordering::SeqCst);
            health.rejected = self.rejected.load(Ordering::SeqCst);
            health.shutting_down = !self.accepting.load(Ordering::SeqCst);
            if let Some(err) = last_error {
                health.last_error = Some(err);
            }
            if success {
                health.last_success_ms = Some(unix_now_ms());
            }
        });
    }
}

impl AsyncWriter {
    /// Spawn the workers. Must be called inside a tokio runtime.
    pub fn start(search: Arc<dyn SearchBackend>, config: WriterConfig) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity.max(1));
        let queue_rx = Arc::new(TokioMutex::new(queue_rx));
        let (health_tx, health_rx) = watch::channel(WriterHealth::default());
        let shared = Arc::new(WriterShared {
            accepting: AtomicBool::new(true),
            accepted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            health_tx,
            _health_guard: health_rx,
        });

        let workers = (0..config.workers.max(1))
            .map(|slot| {
                tokio::spawn(write_loop(
                    slot,
                    search.clone(),
                    queue_rx.clone(),
                    shared.clone(),
                ))
            })
            .collect();

        Self {
            inner: Arc::new(AsyncWriterInner {
                queue: Mutex::new(Some(queue_tx)),
                workers: Mutex::new(workers),
                shared,
                shutdown_timeout: config.shutdown_timeout,
            }),
        }
    }

    pub fn upsert(
        &self,
        target: impl Into<String>,
        document: SearchDocument,
    ) -> Result<(), WriteRejected> {
        self.enqueue(WriteOp::Upsert {
            target: target.into(),
            document,
        })
    }

    pub fn delete(&self, target: impl Into<String>, id: impl Into<String>) -> Result<(), WriteRejected> {
        self.enqueue(WriteOp::Delete {
            target: target.into(),
            id: id.into(),
        })
    }

    fn enqueue(&self, op: WriteOp) -> Result<(), WriteRejected> {
        let shared = &self.inner.shared;
        let result = if shared.accepting.load(Ordering::SeqCst) {
            let queue = lock(&self.inner.queue);
            match queue.as_ref() {
                Some(sender) => match sender.try_send(op) {
                    Ok(()) => Ok(()),
                    Err(TrySendError::Full(_)) => Err(WriteRejected::QueueFull),
                    Err(TrySendError::Closed(_)) => Err(WriteRejected::ShuttingDown),
                },
                None => Err(WriteRejected::ShuttingDown),
            }
        } else {
            Err(WriteRejected::ShuttingDown)
        };

        match result {
            Ok(()) => shared.accepted.fetch_add(1, Ordering::SeqCst),
            Err(reason) => {
                log::debug!("Rejected search write: {reason}");
                shared.rejected.fetch_add(1, Ordering::SeqCst)
            }
        };
        shared.publish(None, false);
        result
    }

    #[must_use]
    pub fn health_snapshot(&self) -> WriterHealth {
        self.inner.shared.health_tx.borrow().clone()
    }

    #[must_use]
    pub fn health_stream(&self) -> watch::Receiver<WriterHealth> {
        self.inner.shared.health_tx.subscribe()
    }

    /// Shut down with the configured timeout.
    pub async fn close(&self) -> ShutdownReport {
        self.shutdown(self.inner.shutdown_timeout).await
    }

    /// Stop accepting, drain for up to `timeout`, then abort what is left.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        self.inner.stop_accepting();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *lock(&self.inner.workers));

        let deadline = Instant::now() + timeout;
        let mut drained = true;
        for mut handle in handles {
            if !drained {
                handle.abort();
                continue;
            }
            match time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => log::error!("Search writer worker ended abnormally: {err}"),
                Err(_) => {
                    drained = false;
                    handle.abort();
                }
            }
        }

        let shared = &self.inner.shared;
        let report = ShutdownReport {
            drained,
            completed: shared.completed.load(Ordering::SeqCst),
            failed: shared.failed.load(Ordering::SeqCst),
        };
        if drained {
            log::info!(
                "Search writer drained: {} completed, {} failed",
                report.completed,
                report.failed
            );
        } else {
            log::warn!(
                "Search writer drain timed out after {timeout:?}; {} write(s) abandoned",
                self.health_snapshot().in_flight()
            );
        }
        report
    }
}

impl AsyncWriterInner {
    fn stop_accepting(&self) {
        self.shared.accepting.store(false, Ordering::SeqCst);
        lock(&self.queue).take();
        self.shared.publish(None, false);
    }
}

impl Drop for AsyncWriter {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) == 1 {
            self.inner.stop_accepting();
        }
    }
}

async fn write_loop(
    slot: usize,
    search: Arc<dyn SearchBackend>,
    queue: Arc<TokioMutex<mpsc::Receiver<WriteOp>>>,
    shared: Arc<WriterShared>,
) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(op) = next else {
            log::debug!("Search writer {slot} finished");
            break;
        };
        let description = op.describe();
        let result = match op {
            WriteOp::Upsert { target, document } => search.index_one(&target, document).await,
            WriteOp::Delete { target, id } => search.delete_document(&target, &id).await.map(|_| ()),
        };
        match result {
            Ok(()) => {
                shared.completed.fetch_add(1, Ordering::SeqCst);
                shared.publish(None, true);
            }
            Err(err) => {
                log::error!("Search write failed ({description}): {err}");
                shared.failed.fetch_add(1, Ordering::SeqCst);
                shared.publish(Some(format!("{description}: {err}")), false);
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
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
    use docsync_search::{IndexMapping, MemorySearchBackend, SearchQuery};
    use pretty_assertions::assert_eq;
    use serde_json::Map;

    const INDEX: &str = "library:patron:v1_1";
    const ALIAS: &str = "library:patron:v1";

    async fn engine() -> Arc<MemorySearchBackend> {
        let search = Arc::new(MemorySearchBackend::new());
        search.create_index(INDEX, &IndexMapping::new()).await.unwrap();
        search.swap_alias(ALIAS, INDEX, &[]).await.unwrap();
        search
    }

    fn doc(id: &str) -> SearchDocument {
        SearchDocument::new(id, Map::new())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn writes_are_applied_and_drained_on_shutdown() {
        let search = engine().await;
        let writer = AsyncWriter::start(search.clone(), WriterConfig::default());
        for i in 0..20 {
            writer.upsert(ALIAS, doc(&format!("p{i}"))).unwrap();
        }
        writer.delete(ALIAS, "p0").unwrap();

        let report = writer.shutdown(Duration::from_secs(5)).await;
        assert!(report.drained);
        assert_eq!(report.failed, 0);
        assert_eq!(report.completed, 21);
        let page = search.query(ALIAS, &SearchQuery::match_all(100)).await.unwrap();
        assert!(page.total >= 19);

        let health = writer.health_snapshot();
        assert!(health.last_success_ms.is_some());
        let value = serde_json::to_value(&health).unwrap();
        assert_eq!(serde_json::from_value::<WriterHealth>(value).unwrap(), health);
        let value = serde_json::to_value(report).unwrap();
        assert_eq!(serde_json::from_value::<ShutdownReport>(value).unwrap(), report);
    }

    #[tokio::test]
    async fn rejects_after_shutdown() {
        let writer = AsyncWriter::start(engine().await, WriterConfig::default());
        writer.shutdown(Duration::from_secs(1)).await;
        assert_eq!(writer.upsert(ALIAS, doc("late")), Err(WriteRejected::ShuttingDown));
        let health = writer.health_snapshot();
        assert_eq!(health.rejected, 1);
        assert!(health.shutting_down);
    }

    #[tokio::test]
    async fn full_queue_rejects_immediately() {
        let search = engine().await;
        // Current-thread runtime: workers cannot run until we yield.
        let writer = AsyncWriter::start(
            search,
            WriterConfig {
                workers: 1,
                queue_capacity: 2,
                ..WriterConfig::default()
            },
        );
        writer.upsert(ALIAS, doc("a")).unwrap();
        writer.upsert(ALIAS, doc("b")).unwrap();
        assert_eq!(writer.upsert(ALIAS, doc("c")), Err(WriteRejected::QueueFull));
        assert_eq!(writer.health_snapshot().rejected, 1);
        assert!(writer.shutdown(Duration::from_secs(1)).await.drained);
    }

    #[tokio::test]
    async fn failures_are_counted_not_returned() {
        let search = Arc::new(MemorySearchBackend::new());
        let writer = AsyncWriter::start(search, WriterConfig::default());
        writer.upsert("missing-index", doc("a")).unwrap();
        let report = writer.shutdown(Duration::from_secs(1)).await;
        assert_eq!(report.failed, 1);
        let health = writer.health_snapshot();
        assert_eq!(health.failed, 1);
        assert!(health.last_error.unwrap().contains("missing-index"));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_gives_up_after_timeout() {
        let search = engine().await;
        let slow = Arc::new(SlowBackend(search));
        let writer = AsyncWriter::start(
            slow,
            WriterConfig {
                workers: 1,
                ..WriterConfig::default()
            },
        );
        writer.upsert(ALIAS, doc("a")).unwrap();
        writer.upsert(ALIAS, doc("b")).unwrap();

        let report = writer.shutdown(Duration::from_millis(100)).await;
        assert!(!report.drained);
        assert_eq!(report.completed, 0);
    }

    struct SlowBackend(Arc<MemorySearchBackend>);

    #[async_trait::async_trait]
    impl SearchBackend for SlowBackend {
        async fn create_index(&self, name: &str, mapping: &IndexMapping) -> docsync_search::Result<()> {
            self.0.create_index(name, mapping).await
        }

        async fn delete_index(&self, name: &str, timeout: Duration) -> docsync_search::Result<()> {
            self.0.delete_index(name, timeout).await
        }

        async fn index_exists(&self, name: &str) -> docsync_search::Result<bool> {
            self.0.index_exists(name).await
        }

        async fn list_indices(&self, prefix: &str) -> docsync_search::Result<Vec<String>> {
            self.0.list_indices(prefix).await
        }

        async fn bulk_index(
            &self,
            index: &str,
            documents: Vec<SearchDocument>,
        ) -> docsync_search::Result<docsync_search::BulkSummary> {
            self.0.bulk_index(index, documents).await
        }

        async fn index_one(&self, target: &str, document: SearchDocument) -> docsync_search::Result<()> {
            time::sleep(Duration::from_secs(60)).await;
            self.0.index_one(target, document).await
        }

        async fn query(
            &self,
            target: &str,
            query: &SearchQuery,
        ) -> docsync_search::Result<docsync_search::SearchPage> {
            self.0.query(target, query).await
        }

        async fn delete_document(&self, target: &str, id: &str) -> docsync_search::Result<bool> {
            self.0.delete_document(target, id).await
        }

        async fn alias_targets(
            &self,
            alias: &str,
        ) -> docsync_search::Result<std::collections::BTreeSet<String>> {
            self.0.alias_targets(alias).await
        }

        async fn update_aliases(
            &self,
            actions: &[docsync_search::AliasAction],
        ) -> docsync_search::Result<()> {
            self.0.update_aliases(actions).await
        }
    }
}
