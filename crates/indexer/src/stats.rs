use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

/// Point-in-time view of a running task pool, handed to heartbeats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PoolProgress {
    pub items_seen: u64,
    pub items_processed: u64,
    pub tasks_submitted: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub tasks_stopped: u64,
    pub tasks_pending: u64,
    pub elapsed_ms: u64,
}

#[derive(Debug)]
pub(crate) struct PoolCounters {
    started: Instant,
    pub(crate) pending: AtomicUsize,
    items_seen: AtomicU64,
    items_processed: AtomicU64,
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    stopped: AtomicU64,
}

impl PoolCounters {
    pub(crate) fn new() -> Self {
        Self {
            started: Instant::now(),
            pending: AtomicUsize::new(0),
            items_seen: AtomicU64::new(0),
            items_processed: AtomicU64::new(0),
            submitted: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            stopped: AtomicU64::new(0),
        }
    }

    pub(crate) fn add_seen(&self, n: u64) {
        self.items_seen.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_processed(&self, n: u64) {
        self.items_processed.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_stopped(&self) {
        self.stopped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    pub(crate) fn stopped(&self) -> u64 {
        self.stopped.load(Ordering::SeqCst)
    }

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn snapshot(&self) -> PoolProgress {
        PoolProgress {
            items_seen: self.items_seen.load(Ordering::Relaxed),
            items_processed: self.items_processed.load(Ordering::Relaxed),
            tasks_submitted: self.submitted.load(Ordering::Relaxed),
            tasks_succeeded: self.succeeded.load(Ordering::Relaxed),
            tasks_failed: self.failed.load(Ordering::Relaxed),
            tasks_stopped: self.stopped.load(Ordering::Relaxed),
            tasks_pending: self.pending.load(Ordering::SeqCst) as u64,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}
