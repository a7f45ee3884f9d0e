use crate::reconcile::ReconcileReport;
use crate::{IndexerError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const REINDEX_REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    CreateGeneration,
    Backfill,
    SwapAlias,
    CleanupOldGenerations,
    Done,
    Failed,
}

impl JobState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// The only state reachable from `self` on success.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::CreateGeneration => Some(Self::Backfill),
            Self::Backfill => Some(Self::SwapAlias),
            Self::SwapAlias => Some(Self::CleanupOldGenerations),
            Self::CleanupOldGenerations => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }
}

/// State machine of one reindex run; rejects out-of-order transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReindexJob {
    state: JobState,
    history: Vec<JobState>,
    failed_in: Option<JobState>,
}

impl Default for ReindexJob {
    fn default() -> Self {
        Self::new()
    }
}

impl ReindexJob {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: JobState::CreateGeneration,
            history: vec![JobState::CreateGeneration],
            failed_in: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> JobState {
        self.state
    }

    #[must_use]
    pub fn history(&self) -> &[JobState] {
        &self.history
    }

    /// State the job was in when it failed.
    #[must_use]
    pub fn failed_in(&self) -> Option<JobState> {
        self.failed_in
    }

    pub fn advance(&mut self, to: JobState) -> Result<()> {
        if self.state.next() != Some(to) {
            return Err(IndexerError::Other(format!(
                "illegal reindex transition {:?} -> {to:?}",
                self.state
            )));
        }
        self.state = to;
        self.history.push(to);
        Ok(())
    }

    pub fn fail(&mut self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(IndexerError::Other(format!(
                "cannot fail a job that is already {:?}",
                self.state
            )));
        }
        self.failed_in = Some(self.state);
        self.state = JobState::Failed;
        self.history.push(JobState::Failed);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct ReindexReport {
    pub schema_version: u32,
    pub kind: String,
    pub alias: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<String>,
    pub state: JobState,
    pub history: Vec<JobState>,
    pub documents_indexed: u64,
    pub keys_seen: u64,
    pub skipped: u64,
    #[serde(default)]
    pub removed_generations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orphaned_generation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconcile: Option<ReconcileReport>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReindexReport {
    pub fn new(kind: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            schema_version: REINDEX_REPORT_SCHEMA_VERSION,
            kind: kind.into(),
            alias: alias.into(),
            generation: None,
            state: JobState::CreateGeneration,
            history: Vec::new(),
            documents_indexed: 0,
            keys_seen: 0,
            skipped: 0,
            removed_generations: Vec::new(),
            orphaned_generation: None,
            reconcile: None,
            duration_ms: 0,
            error: None,
        }
    }

    /// A report for a run that never started.
    pub fn rejected(kind: impl Into<String>, error: impl Into<String>) -> Self {
        let mut report = Self::new(kind, "");
        report.state = JobState::Failed;
        report.history = vec![JobState::Failed];
        report.error = Some(error.into());
        report
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.state == JobState::Done
    }
}
