use crate::job::ReindexReport;
use crate::pool::StopSignal;
use crate::registry::{CollectionRegistration, CollectionRegistry};
use crate::reindex::{ReindexConfig, Reindexer};
use crate::IndexerError;
use docsync_search::{IndexGeneration, SearchBackend};
use docsync_store::{CollectionKind, ObjectStore};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(3600);
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BatchReport {
    pub jobs: Vec<ReindexReport>,
    /// Kinds still running when the batch timed out.
    #[serde(default)]
    pub unfinished: Vec<String>,
    pub timed_out: bool,
    /// Unbound generations left behind by aborted jobs.
    #[serde(default)]
    pub orphaned_generations: Vec<String>,
    pub duration_ms: u64,
}

impl BatchReport {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.jobs.iter().all(ReindexReport::succeeded)
    }

    #[must_use]
    pub fn failed_kinds(&self) -> Vec<&str> {
        self.jobs
            .iter()
            .filter(|job| !job.succeeded())
            .map(|job| job.kind.as_str())
            .collect()
    }
}

/// Runs reindex jobs for many kinds with bounded parallelism.
pub struct SyncCoordinator {
    registry: Arc<CollectionRegistry>,
    store: Arc<dyn ObjectStore>,
    search: Arc<dyn SearchBackend>,
    reindex: ReindexConfig,
    batch_timeout: Duration,
    stop_grace: Duration,
    stop: StopSignal,
}

impl SyncCoordinator {
    pub fn new(
        registry: Arc<CollectionRegistry>,
        store: Arc<dyn ObjectStore>,
        search: Arc<dyn SearchBackend>,
    ) -> Self {
        Self {
            registry,
            store,
            search,
            reindex: ReindexConfig::default(),
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            stop_grace: DEFAULT_STOP_GRACE,
            stop: StopSignal::new(),
        }
    }

    #[must_use]
    pub fn with_reindex_config(mut self, config: ReindexConfig) -> Self {
        self.reindex = config;
        self
    }

    #[must_use]
    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
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

    #[must_use]
    pub fn registry(&self) -> &CollectionRegistry {
        &self.registry
    }

    /// Reindex every registered kind.
    pub async fn run_registered(&self, workers: usize) -> BatchReport {
        let kinds = self.registry.kinds();
        self.run_all(&kinds, workers).await
    }

    /// Reindex `kinds` with at most `workers` jobs in flight.
    ///
    /// A failed job never cancels its siblings. On timeout the stop signal is
    /// raised and running jobs get the stop grace period to roll back before
    /// they are aborted.
    pub async fn run_all(&self, kinds: &[CollectionKind], workers: usize) -> BatchReport {
        let started = Instant::now();
        let mut report = BatchReport::default();
        let permits = Arc::new(Semaphore::new(workers.max(1)));
        let mut jobs = JoinSet::new();
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut pending: BTreeMap<String, CollectionRegistration> = BTreeMap::new();

        for kind in kinds {
            if !seen.insert(kind.as_str()) {
                log::warn!("{kind} requested twice in one batch; running it once");
                continue;
            }
            let Some(registration) = self.registry.get(kind) else {
                log::error!("Cannot reindex {kind}: not registered");
                report.jobs.push(ReindexReport::rejected(
                    kind.as_str(),
                    IndexerError::UnknownCollection(kind.clone()).to_string(),
                ));
                continue;
            };
            pending.insert(kind.as_str().to_string(), registration.clone());
            let reindexer = Reindexer::new(self.store.clone(), self.search.clone())
                .with_config(self.reindex.clone())
                .with_stop_signal(self.stop.clone());
            let permits = permits.clone();
            jobs.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                reindexer.reindex(&registration).await
            });
        }

        let deadline = tokio::time::sleep(self.batch_timeout);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                joined = jobs.join_next() => match joined {
                    None => break,
                    Some(joined) => collect(joined, &mut pending, &mut report),
                },
                () = &mut deadline => {
                    log::error!(
                        "Batch timed out after {:?}; stopping {} job(s)",
                        self.batch_timeout,
                        pending.len()
                    );
                    report.timed_out = true;
                    self.stop.stop();
                    self.wind_down(&mut jobs, &mut pending, &mut report).await;
                    break;
                }
            }
        }

        if report.timed_out {
            for registration in pending.values() {
                for name in self.unbound_generations(registration).await {
                    log::error!(
                        "Generation {name} of aborted job {} is orphaned; delete it manually",
                        registration.kind
                    );
                    report.orphaned_generations.push(name);
                }
            }
            report.unfinished = pending.into_keys().collect();
        } else {
            for kind in pending.into_keys() {
                report.jobs.push(ReindexReport::rejected(
                    kind.as_str(),
                    IndexerError::TaskPanicked(format!("reindex of {kind}")).to_string(),
                ));
            }
        }
        report.duration_ms = started.elapsed().as_millis() as u64;

        let failed = report.failed_kinds();
        log::info!(
            "Batch finished: {} job(s), {} failed, {} unfinished ({}ms)",
            report.jobs.len(),
            failed.len(),
            report.unfinished.len(),
            report.duration_ms
        );
        report
    }

    /// Wait up to the stop grace for stopped jobs to return, then abort the rest.
    async fn wind_down(
        &self,
        jobs: &mut JoinSet<ReindexReport>,
        pending: &mut BTreeMap<String, CollectionRegistration>,
        report: &mut BatchReport,
    ) {
        let grace = tokio::time::sleep(self.stop_grace);
        tokio::pin!(grace);
        loop {
            tokio::select! {
                joined = jobs.join_next() => match joined {
                    None => return,
                    Some(joined) => collect(joined, pending, report),
                },
                () = &mut grace => break,
            }
        }

        log::error!(
            "Aborting {} job(s) still running after {:?}",
            jobs.len(),
            self.stop_grace
        );
        jobs.abort_all();
        while let Some(joined) = jobs.join_next().await {
            if let Ok(job) = joined {
                pending.remove(&job.kind);
                report.jobs.push(job);
            }
        }
    }

    /// Generations of the identity that the alias does not serve.
    async fn unbound_generations(&self, registration: &CollectionRegistration) -> Vec<String> {
        let identity = &registration.identity;
        let names = match self.search.list_indices(&identity.generation_prefix()).await {
            Ok(names) => names,
            Err(err) => {
                log::warn!("Cannot list generations of {identity}: {err}");
                return Vec::new();
            }
        };
        let bound = match self.search.alias_targets(&identity.alias()).await {
            Ok(bound) => bound,
            Err(err) => {
                log::warn!("Cannot read alias {identity}: {err}");
                return Vec::new();
            }
        };
        names
            .into_iter()
            .filter(|name| {
                !bound.contains(name) && IndexGeneration::parse(identity, name).is_some()
            })
            .collect()
    }
}

fn collect(
    joined: std::result::Result<ReindexReport, JoinError>,
    pending: &mut BTreeMap<String, CollectionRegistration>,
    report: &mut BatchReport,
) {
    match joined {
        Ok(job) => {
            pending.remove(&job.kind);
            report.jobs.push(job);
        }
        Err(err) => log::error!("Reindex job ended abnormally: {err}"),
    }
}
