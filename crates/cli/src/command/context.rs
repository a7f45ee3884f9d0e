use anyhow::{anyhow, Context as AnyhowContext, Result};
use docsync_indexer::{CollectionRegistration, CollectionRegistry, SyncConfig};
use docsync_search::MemorySearchBackend;
use docsync_store::{CollectionKind, FsObjectStore};
use std::path::Path;
use std::sync::Arc;

/// Everything a command needs, built once from the config file.
pub struct CommandContext {
    pub config: SyncConfig,
    pub registry: Arc<CollectionRegistry>,
    pub store: Arc<FsObjectStore>,
    pub search: Arc<MemorySearchBackend>,
}

impl CommandContext {
    pub async fn load(config_path: &Path) -> Result<Self> {
        let config = if config_path.exists() {
            SyncConfig::load(config_path)
                .with_context(|| format!("Failed to load {}", config_path.display()))?
        } else {
            log::warn!(
                "No config at {}, using defaults with no collections",
                config_path.display()
            );
            SyncConfig::default()
        };

        let registry = config
            .build_registry()
            .context("Failed to register collections")?;
        let store = FsObjectStore::new(config.store.root.clone());
        let search = MemorySearchBackend::load_snapshot(
            &config.search.snapshot_path,
            config.search.max_result_window,
        )
        .await
        .with_context(|| {
            format!(
                "Failed to load search snapshot {}",
                config.search.snapshot_path.display()
            )
        })?;
        log::debug!(
            "Store at {}, search snapshot at {}",
            config.store.root.display(),
            config.search.snapshot_path.display()
        );

        Ok(Self {
            config,
            registry: Arc::new(registry),
            store: Arc::new(store),
            search: Arc::new(search),
        })
    }

    pub fn registration(&self, kind: &str) -> Result<CollectionRegistration> {
        let kind = CollectionKind::new(kind)?;
        self.registry
            .get(&kind)
            .ok_or_else(|| anyhow!("Collection {kind} is not configured"))
    }

    /// Save the search engine so the next run sees this one's writes.
    pub async fn persist(&self) -> Result<()> {
        let path = &self.config.search.snapshot_path;
        self.search
            .save_snapshot(path)
            .await
            .with_context(|| format!("Failed to save search snapshot {}", path.display()))
    }
}
