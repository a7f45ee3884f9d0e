//! Bounded-concurrency task pool with cooperative cancellation.
//!
//! A pool runs `workers` worker slots draining a bounded queue, plus one
//! extra slot for the initial task. The initial task is usually a producer
//! (listing keys) that submits follow-up tasks through its [`TaskContext`];
//! because the queue is bounded, the producer never runs far ahead of the
//! consumers.
//!
//! The pool wakes up every `poll_interval` to hand a [`PoolProgress`] to the
//! heartbeat and to check whether every task reached a terminal state.

use crate::stats::{PoolCounters, PoolProgress};
use crate::Result;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex as TokioMutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Terminal state of a task, and of a pool as the conjunction of its tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Success,
    Error,
    Stopped,
}

impl TaskOutcome {
    /// `Error` dominates `Stopped`, which dominates `Success`.
    #[must_use]
    pub fn combine(self, other: Self) -> Self {
        match (self, other) {
            (Self::Error, _) | (_, Self::Error) => Self::Error,
            (Self::Stopped, _) | (_, Self::Stopped) => Self::Stopped,
            _ => Self::Success,
        }
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// Shared cooperative stop flag.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A unit of work run by a [`TaskPool`].
///
/// Long-running tasks should consult [`TaskContext::should_stop`] between
/// items and return [`TaskOutcome::Stopped`] once it is raised. Returning an
/// error (or panicking) marks the task as [`TaskOutcome::Error`].
#[async_trait]
pub trait Task: Send + 'static {
    fn name(&self) -> String;

    async fn run(self: Box<Self>, ctx: TaskContext) -> Result<TaskOutcome>;
}

/// Progress callback invoked on every pool poll.
pub trait Heartbeat: Send + Sync {
    fn beat(&self, progress: &PoolProgress);
}

impl<F> Heartbeat for F
where
    F: Fn(&PoolProgress) + Send + Sync,
{
    fn beat(&self, progress: &PoolProgress) {
        self(progress);
    }
}

/// Logs progress at `info` under a label.
#[derive(Debug, Clone)]
pub struct LogHeartbeat {
    label: String,
}

impl LogHeartbeat {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl Heartbeat for LogHeartbeat {
    fn beat(&self, progress: &PoolProgress) {
        log::info!(
            "{}: seen {} processed {} (tasks pending {}, failed {}, {}ms)",
            self.label,
            progress.items_seen,
            progress.items_processed,
            progress.tasks_pending,
            progress.tasks_failed,
            progress.elapsed_ms
        );
    }
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub workers: usize,
    pub poll_interval: Duration,
    pub queue_capacity: usize,
}

impl PoolConfig {
    #[must_use]
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            poll_interval: DEFAULT_POLL_INTERVAL,
            queue_capacity: workers * 4,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolReport {
    pub outcome: TaskOutcome,
    pub progress: PoolProgress,
}

struct PoolShared {
    counters: PoolCounters,
    stop: StopSignal,
    idle: Notify,
}

impl PoolShared {
    fn record(&self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Success => self.counters.add_succeeded(),
            TaskOutcome::Error => self.counters.add_failed(),
            TaskOutcome::Stopped => self.counters.add_stopped(),
        }
    }

    fn finish_one(&self) {
        if self.counters.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_one();
        }
    }
}

/// Handle given to a running task.
#[derive(Clone)]
pub struct TaskContext {
    shared: Arc<PoolShared>,
    sender: mpsc::Sender<Box<dyn Task>>,
}

impl TaskContext {
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.shared.stop.is_stopped()
    }

    #[must_use]
    pub fn stop_signal(&self) -> &StopSignal {
        &self.shared.stop
    }

    /// Queue a follow-up task, waiting while the queue is full.
    ///
    /// Returns `false` without queueing once the stop signal is raised.
    pub async fn submit(&self, task: Box<dyn Task>) -> bool {
        if self.should_stop() {
            return false;
        }
        self.shared.counters.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(task).await.is_err() {
            self.shared.finish_one();
            return false;
        }
        self.shared.counters.add_submitted();
        true
    }

    pub fn record_seen(&self, n: u64) {
        self.shared.counters.add_seen(n);
    }

    pub fn record_processed(&self, n: u64) {
        self.shared.counters.add_processed(n);
    }
}

/// Runs one initial task and everything it submits; torn down afterwards.
pub struct TaskPool {
    config: PoolConfig,
    stop: StopSignal,
}

impl TaskPool {
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            stop: StopSignal::new(),
        }
    }

    /// Share an external stop signal with the pool's tasks.
    #[must_use]
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    #[must_use]
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub async fn run(self, initial: Box<dyn Task>, heartbeat: &dyn Heartbeat) -> PoolReport {
        let workers = self.config.workers.max(1);
        let (sender, receiver) = mpsc::channel(self.config.queue_capacity.max(1));
        let receiver = Arc::new(TokioMutex::new(receiver));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let shared = Arc::new(PoolShared {
            counters: PoolCounters::new(),
            stop: self.stop.clone(),
            idle: Notify::new(),
        });
        shared.counters.pending.store(1, Ordering::SeqCst);
        shared.counters.add_submitted();

        let ctx = TaskContext {
            shared: shared.clone(),
            sender,
        };

        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(workers + 1);
        for slot in 0..workers {
            handles.push(tokio::spawn(worker_loop(
                slot,
                receiver.clone(),
                shutdown_rx.clone(),
                ctx.clone(),
            )));
        }

        let lister_ctx = ctx.clone();
        let lister_shared = shared.clone();
        handles.push(tokio::spawn(async move {
            let outcome = run_contained(initial, lister_ctx).await;
            lister_shared.record(outcome);
            lister_shared.finish_one();
        }));
        drop(ctx);

        let mut ticker = time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => heartbeat.beat(&shared.counters.snapshot()),
                () = shared.idle.notified() => {}
            }
            if shared.counters.pending.load(Ordering::SeqCst) == 0 {
                break;
            }
        }

        let _ = shutdown_tx.send(true);
        for handle in handles {
            if let Err(err) = handle.await {
                log::error!("Task pool slot ended abnormally: {err}");
            }
        }

        let progress = shared.counters.snapshot();
        heartbeat.beat(&progress);

        let mut outcome = TaskOutcome::Success;
        if shared.counters.stopped() > 0 || self.stop.is_stopped() {
            outcome = outcome.combine(TaskOutcome::Stopped);
        }
        if shared.counters.failed() > 0 {
            outcome = outcome.combine(TaskOutcome::Error);
        }
        PoolReport { outcome, progress }
    }
}

async fn worker_loop(
    slot: usize,
    receiver: Arc<TokioMutex<mpsc::Receiver<Box<dyn Task>>>>,
    mut shutdown: watch::Receiver<bool>,
    ctx: TaskContext,
) {
    loop {
        let next = {
            let mut rx = receiver.lock().await;
            if *shutdown.borrow() {
                None
            } else {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => None,
                    task = rx.recv() => task,
                }
            }
        };
        let Some(task) = next else {
            break;
        };

        if ctx.should_stop() {
            log::debug!("Worker {slot}: stop requested, skipping {}", task.name());
            ctx.shared.record(TaskOutcome::Stopped);
            ctx.shared.finish_one();
            continue;
        }

        let outcome = run_contained(task, ctx.clone()).await;
        ctx.shared.record(outcome);
        ctx.shared.finish_one();
    }
}

/// Run a task in its own tokio task so errors and panics become `Error`.
async fn run_contained(task: Box<dyn Task>, ctx: TaskContext) -> TaskOutcome {
    let name = task.name();
    match tokio::spawn(task.run(ctx)).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(err)) => {
            log::error!("Task {name} failed: {err}");
            TaskOutcome::Error
        }
        Err(err) => {
            log::error!("Task {name} panicked: {err}");
            TaskOutcome::Error
        }
    }
}
