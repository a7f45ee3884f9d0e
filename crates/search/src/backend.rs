use crate::{IndexMapping, Result, SearchDocument, SearchPage, SearchQuery};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// One step of an alias update request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AliasAction {
    Add { index: String, alias: String },
    Remove { index: String, alias: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkFailure {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkSummary {
    pub indexed: usize,
    pub failures: Vec<BulkFailure>,
}

impl BulkSummary {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The search engine as seen by the sync engine.
///
/// A `target` is either a physical index name or an alias. Reads on an alias
/// cover every index bound to it; writes on an alias need exactly one bound
/// index.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn create_index(&self, name: &str, mapping: &IndexMapping) -> Result<()>;

    /// Delete a physical index, giving up after `timeout`.
    async fn delete_index(&self, name: &str, timeout: Duration) -> Result<()>;

    async fn index_exists(&self, name: &str) -> Result<bool>;

    /// Physical index names starting with `prefix`, sorted.
    async fn list_indices(&self, prefix: &str) -> Result<Vec<String>>;

    async fn bulk_index(&self, index: &str, documents: Vec<SearchDocument>)
        -> Result<BulkSummary>;

    async fn index_one(&self, target: &str, document: SearchDocument) -> Result<()>;

    async fn query(&self, target: &str, query: &SearchQuery) -> Result<SearchPage>;

    /// Returns whether a document was removed.
    async fn delete_document(&self, target: &str, id: &str) -> Result<bool>;

    /// Physical indices currently bound to `alias`; empty when unbound.
    async fn alias_targets(&self, alias: &str) -> Result<BTreeSet<String>>;

    /// Apply every action or none of them, as one request.
    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<()>;

    /// Point `alias` at `add` and detach `remove`, in one atomic request.
    async fn swap_alias(&self, alias: &str, add: &str, remove: &[String]) -> Result<()> {
        let mut actions = Vec::with_capacity(remove.len() + 1);
        actions.push(AliasAction::Add {
            index: add.to_string(),
            alias: alias.to_string(),
        });
        actions.extend(
            remove
                .iter()
                .filter(|index| index.as_str() != add)
                .map(|index| AliasAction::Remove {
                    index: index.clone(),
                    alias: alias.to_string(),
                }),
        );
        self.update_aliases(&actions).await
    }
}
