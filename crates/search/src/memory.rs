use crate::query::Matcher;
use crate::{
    AliasAction, BulkFailure, BulkSummary, IndexMapping, Result, SearchBackend, SearchDocument,
    SearchError, SearchHit, SearchPage, SearchQuery,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

pub const DEFAULT_MAX_RESULT_WINDOW: usize = 10_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct EngineState {
    pub(crate) indices: BTreeMap<String, MemoryIndex>,
    pub(crate) aliases: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct MemoryIndex {
    pub(crate) mapping: IndexMapping,
    pub(crate) documents: BTreeMap<String, Map<String, Value>>,
}

#[derive(Default)]
struct Faults {
    fail_create: bool,
    fail_bulk: bool,
    fail_bulk_ids: HashSet<String>,
    fail_alias_updates: bool,
    fail_query: bool,
    delete_index_failures: usize,
    delete_index_delay: Option<Duration>,
    fail_delete_document: HashSet<String>,
}

/// In-process search engine with the index/alias semantics the sync engine
/// relies on.
///
/// Every alias update request is validated and applied under one write lock,
/// so a concurrent reader sees either the state before or after the request.
pub struct MemorySearchBackend {
    state: RwLock<EngineState>,
    max_result_window: usize,
    alias_requests: AtomicUsize,
    faults: Mutex<Faults>,
}

impl Default for MemorySearchBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySearchBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_result_window(DEFAULT_MAX_RESULT_WINDOW)
    }

    #[must_use]
    pub fn with_max_result_window(max_result_window: usize) -> Self {
        Self::from_state(EngineState::default(), max_result_window)
    }

    pub(crate) fn from_state(state: EngineState, max_result_window: usize) -> Self {
        Self {
            state: RwLock::new(state),
            max_result_window: max_result_window.max(1),
            alias_requests: AtomicUsize::new(0),
            faults: Mutex::new(Faults::default()),
        }
    }

    pub(crate) fn snapshot_state(&self) -> EngineState {
        self.read_state().clone()
    }

    #[must_use]
    pub fn max_result_window(&self) -> usize {
        self.max_result_window
    }

    /// Number of `update_aliases` requests received so far.
    #[must_use]
    pub fn alias_update_count(&self) -> usize {
        self.alias_requests.load(Ordering::SeqCst)
    }

    /// Every physical index name, sorted.
    #[must_use]
    pub fn index_names(&self) -> Vec<String> {
        self.read_state().indices.keys().cloned().collect()
    }

    /// Document count of one physical index.
    #[must_use]
    pub fn document_count(&self, index: &str) -> Option<usize> {
        self.read_state()
            .indices
            .get(index)
            .map(|idx| idx.documents.len())
    }

    pub fn set_create_failure(&self, fail: bool) {
        self.with_faults(|f| f.fail_create = fail);
    }

    pub fn set_bulk_failure(&self, fail: bool) {
        self.with_faults(|f| f.fail_bulk = fail);
    }

    /// Report a per-item failure for this document id in bulk requests.
    pub fn fail_bulk_item(&self, id: impl Into<String>) {
        let id = id.into();
        self.with_faults(|f| {
            f.fail_bulk_ids.insert(id);
        });
    }

    pub fn set_alias_update_failure(&self, fail: bool) {
        self.with_faults(|f| f.fail_alias_updates = fail);
    }

    pub fn set_query_failure(&self, fail: bool) {
        self.with_faults(|f| f.fail_query = fail);
    }

    /// Fail the next `count` index deletions.
    pub fn fail_next_index_deletions(&self, count: usize) {
        self.with_faults(|f| f.delete_index_failures = count);
    }

    /// Make index deletion take this long before completing.
    pub fn set_index_deletion_delay(&self, delay: Option<Duration>) {
        self.with_faults(|f| f.delete_index_delay = delay);
    }

    pub fn fail_document_delete(&self, id: impl Into<String>) {
        let id = id.into();
        self.with_faults(|f| {
            f.fail_delete_document.insert(id);
        });
    }

    pub fn clear_faults(&self) {
        self.with_faults(|f| *f = Faults::default());
    }

    fn with_faults<R>(&self, apply: impl FnOnce(&mut Faults) -> R) -> R {
        let mut guard = match self.faults.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        apply(&mut guard)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, EngineState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, EngineState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl EngineState {
    fn read_targets(&self, target: &str) -> Result<Vec<String>> {
        if self.indices.contains_key(target) {
            return Ok(vec![target.to_string()]);
        }
        match self.aliases.get(target) {
            Some(indices) if !indices.is_empty() => Ok(indices.iter().cloned().collect()),
            _ => Err(SearchError::IndexNotFound(target.to_string())),
        }
    }

    fn write_target(&self, target: &str) -> Result<String> {
        let targets = self.read_targets(target)?;
        if targets.len() != 1 {
            return Err(SearchError::AmbiguousWriteTarget {
                alias: target.to_string(),
                targets: targets.len(),
            });
        }
        Ok(targets.into_iter().next().unwrap_or_default())
    }

    fn validate_alias_actions(&self, actions: &[AliasAction]) -> Result<()> {
        if actions.is_empty() {
            return Err(SearchError::InvalidAliasAction("no actions".into()));
        }
        for action in actions {
            match action {
                AliasAction::Add { index, alias } => {
                    if !self.indices.contains_key(index) {
                        return Err(SearchError::IndexNotFound(index.clone()));
                    }
                    if self.indices.contains_key(alias) {
                        return Err(SearchError::InvalidAliasAction(format!(
                            "alias {alias} collides with an index name"
                        )));
                    }
                }
                AliasAction::Remove { index, alias } => {
                    let bound = self
                        .aliases
                        .get(alias)
                        .is_some_and(|indices| indices.contains(index));
                    if !bound {
                        return Err(SearchError::InvalidAliasAction(format!(
                            "{index} is not bound to {alias}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SearchBackend for MemorySearchBackend {
    async fn create_index(&self, name: &str, mapping: &IndexMapping) -> Result<()> {
        if self.with_faults(|f| f.fail_create) {
            return Err(SearchError::Unavailable(format!(
                "injected create failure for {name}"
            )));
        }
        let mut state = self.write_state();
        if state.indices.contains_key(name) || state.aliases.contains_key(name) {
            return Err(SearchError::IndexAlreadyExists(name.to_string()));
        }
        state.indices.insert(
            name.to_string(),
            MemoryIndex {
                mapping: mapping.clone(),
                documents: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_index(&self, name: &str, timeout: Duration) -> Result<()> {
        let (delay, fail) = self.with_faults(|f| {
            let fail = f.delete_index_failures > 0;
            if fail {
                f.delete_index_failures -= 1;
            }
            (f.delete_index_delay, fail)
        });

        let work = async {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if fail {
                return Err(SearchError::Unavailable(format!(
                    "injected delete failure for {name}"
                )));
            }
            let mut state = self.write_state();
            if state.indices.remove(name).is_none() {
                return Err(SearchError::IndexNotFound(name.to_string()));
            }
            for indices in state.aliases.values_mut() {
                indices.remove(name);
            }
            state.aliases.retain(|_, indices| !indices.is_empty());
            Ok(())
        };

        tokio::time::timeout(timeout, work)
            .await
            .map_err(|_| SearchError::Timeout(timeout))?
    }

    async fn index_exists(&self, name: &str) -> Result<bool> {
        Ok(self.read_state().indices.contains_key(name))
    }

    async fn list_indices(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .read_state()
            .indices
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn bulk_index(
        &self,
        index: &str,
        documents: Vec<SearchDocument>,
    ) -> Result<BulkSummary> {
        let failing_ids = self.with_faults(|f| {
            if f.fail_bulk {
                None
            } else {
                Some(f.fail_bulk_ids.clone())
            }
        });
        let Some(failing_ids) = failing_ids else {
            return Err(SearchError::Unavailable(format!(
                "injected bulk failure for {index}"
            )));
        };

        let mut state = self.write_state();
        let target = state.write_target(index)?;
        let idx = state
            .indices
            .get_mut(&target)
            .ok_or_else(|| SearchError::IndexNotFound(target.clone()))?;

        let mut summary = BulkSummary::default();
        for doc in documents {
            if failing_ids.contains(&doc.id) {
                summary.failures.push(BulkFailure {
                    id: doc.id,
                    reason: "injected item failure".to_string(),
                });
                continue;
            }
            idx.documents.insert(doc.id, doc.fields);
            summary.indexed += 1;
        }
        Ok(summary)
    }

    async fn index_one(&self, target: &str, document: SearchDocument) -> Result<()> {
        let mut state = self.write_state();
        let index = state.write_target(target)?;
        if let Some(idx) = state.indices.get_mut(&index) {
            idx.documents.insert(document.id, document.fields);
        }
        Ok(())
    }

    async fn query(&self, target: &str, query: &SearchQuery) -> Result<SearchPage> {
        if self.with_faults(|f| f.fail_query) {
            return Err(SearchError::Unavailable(format!(
                "injected query failure for {target}"
            )));
        }
        let matcher = Matcher::parse(&query.query)?;
        if query.search_after.is_some() && query.from > 0 {
            return Err(SearchError::InvalidQuery(
                "from must be 0 when search_after is set".into(),
            ));
        }
        if query.search_after.is_none() {
            let requested = query.from.saturating_add(query.size);
            if requested > self.max_result_window {
                return Err(SearchError::ResultWindowExceeded {
                    requested,
                    max: self.max_result_window,
                });
            }
        }

        let state = self.read_state();
        let mut matched: Vec<SearchHit> = Vec::new();
        for index in state.read_targets(target)? {
            let Some(idx) = state.indices.get(&index) else {
                continue;
            };
            matched.extend(
                idx.documents
                    .iter()
                    .filter(|(_, fields)| matcher.matches(fields))
                    .map(|(id, fields)| SearchHit {
                        index: index.clone(),
                        id: id.clone(),
                        source: fields.clone(),
                    }),
            );
        }
        matched.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.index.cmp(&b.index)));

        let total = matched.len() as u64;
        let hits = match &query.search_after {
            Some(after) => matched
                .into_iter()
                .filter(|hit| hit.id.as_str() > after.as_str())
                .take(query.size)
                .collect(),
            None => matched
                .into_iter()
                .skip(query.from)
                .take(query.size)
                .collect(),
        };
        Ok(SearchPage { total, hits })
    }

    async fn delete_document(&self, target: &str, id: &str) -> Result<bool> {
        if self.with_faults(|f| f.fail_delete_document.contains(id)) {
            return Err(SearchError::Unavailable(format!(
                "injected delete failure for document {id}"
            )));
        }
        let mut state = self.write_state();
        let index = state.write_target(target)?;
        Ok(state
            .indices
            .get_mut(&index)
            .is_some_and(|idx| idx.documents.remove(id).is_some()))
    }

    async fn alias_targets(&self, alias: &str) -> Result<BTreeSet<String>> {
        Ok(self
            .read_state()
            .aliases
            .get(alias)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<()> {
        self.alias_requests.fetch_add(1, Ordering::SeqCst);
        if self.with_faults(|f| f.fail_alias_updates) {
            return Err(SearchError::Unavailable("injected alias update failure".into()));
        }

        let mut state = self.write_state();
        state.validate_alias_actions(actions)?;
        for action in actions {
            match action {
                AliasAction::Add { index, alias } => {
                    state
                        .aliases
                        .entry(alias.clone())
                        .or_default()
                        .insert(index.clone());
                }
                AliasAction::Remove { index, alias } => {
                    if let Some(indices) = state.aliases.get_mut(alias) {
                        indices.remove(index);
                    }
                }
            }
        }
        state.aliases.retain(|_, indices| !indices.is_empty());
        Ok(())
    }
}
