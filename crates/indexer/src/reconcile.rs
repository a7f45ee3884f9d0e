use crate::registry::CollectionRegistration;
use crate::Result;
use docsync_search::{SearchBackend, SearchQuery};
use docsync_store::ObjectStore;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_RECONCILE_PAGE_SIZE: usize = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ReconcileReport {
    pub examined: u64,
    pub deleted: u64,
    pub failures: u64,
}

/// Deletes search documents whose backing object is gone.
///
/// The store wins: nothing is ever deleted from it and missing documents are
/// left for the next reindex.
pub struct Reconciler {
    store: Arc<dyn ObjectStore>,
    search: Arc<dyn SearchBackend>,
    page_size: usize,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ObjectStore>, search: Arc<dyn SearchBackend>) -> Self {
        Self {
            store,
            search,
            page_size: DEFAULT_RECONCILE_PAGE_SIZE,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// One pass over the alias. Fails only when a page cannot be fetched.
    pub async fn reconcile(&self, registration: &CollectionRegistration) -> Result<ReconcileReport> {
        let alias = registration.alias();
        let mut report = ReconcileReport::default();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = SearchQuery::match_all(self.page_size);
            if let Some(after) = cursor.take() {
                query = query.after(after);
            }
            let page = self.search.query(&alias, &query).await?;
            if page.hits.is_empty() {
                break;
            }
            cursor = page.last_id().map(str::to_string);

            for hit in &page.hits {
                report.examined += 1;
                let key = match registration
                    .key_convention
                    .key_for(&registration.kind, &hit.id)
                {
                    Ok(key) => key,
                    Err(err) => {
                        log::warn!("{alias}: document {:?} has no valid store key: {err}", hit.id);
                        report.failures += 1;
                        continue;
                    }
                };
                match self.store.exists(&key).await {
                    Ok(true) => {}
                    Ok(false) => match self.search.delete_document(&alias, &hit.id).await {
                        Ok(_) => {
                            log::debug!("{alias}: removed {} (gone from store)", hit.id);
                            report.deleted += 1;
                        }
                        Err(err) => {
                            log::error!("{alias}: failed to delete stale document {}: {err}", hit.id);
                            report.failures += 1;
                        }
                    },
                    Err(err) => {
                        log::error!("{alias}: cannot check {key}: {err}");
                        report.failures += 1;
                    }
                }
            }

            if page.hits.len() < self.page_size {
                break;
            }
        }

        log::info!(
            "Reconciled {alias}: examined {}, deleted {}, failures {}",
            report.examined,
            report.deleted,
            report.failures
        );
        Ok(report)
    }
}
