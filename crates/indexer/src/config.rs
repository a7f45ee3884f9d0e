//! `docsync.toml`: where objects live, where the search snapshot lives, and
//! how hard to push both during a reindex.

use crate::coordinator::{DEFAULT_BATCH_TIMEOUT, DEFAULT_STOP_GRACE};
use crate::registry::{CollectionRegistration, CollectionRegistry};
use crate::reindex::{ReindexConfig, DEFAULT_BULK_BATCH_SIZE, DEFAULT_REINDEX_WORKERS};
use crate::scanner::ScanConfig;
use crate::writer::WriterConfig;
use crate::{IndexerError, Result};
use docsync_search::{IndexIdentity, IndexMapping, DEFAULT_MAX_RESULT_WINDOW};
use docsync_store::{CollectionKind, ObjectKey, DEFAULT_LIST_PAGE_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub search: SearchSection,
    #[serde(default)]
    pub reindex: ReindexSection,
    #[serde(default)]
    pub writer: WriterSection,
    #[serde(default)]
    pub collections: Vec<CollectionSection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_store_root")]
    pub root: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            root: default_store_root(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSection {
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    #[serde(default = "default_max_result_window")]
    pub max_result_window: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            max_result_window: default_max_result_window(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReindexSection {
    #[serde(default = "default_reindex_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_list_page_size")]
    pub list_page_size: usize,
    #[serde(default = "default_bulk_batch_size")]
    pub bulk_batch_size: usize,
    #[serde(default = "default_reconcile_page_size")]
    pub reconcile_page_size: usize,
    #[serde(default = "default_delete_timeouts_secs")]
    pub delete_timeouts_secs: Vec<u64>,
    #[serde(default = "default_batch_timeout_secs")]
    pub batch_timeout_secs: u64,
    /// How long timed-out jobs get to roll back before they are aborted.
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,
}

impl Default for ReindexSection {
    fn default() -> Self {
        Self {
            workers: default_reindex_workers(),
            queue_capacity: default_queue_capacity(),
            poll_interval_ms: default_poll_interval_ms(),
            list_page_size: default_list_page_size(),
            bulk_batch_size: default_bulk_batch_size(),
            reconcile_page_size: default_reconcile_page_size(),
            delete_timeouts_secs: default_delete_timeouts_secs(),
            batch_timeout_secs: default_batch_timeout_secs(),
            stop_grace_secs: default_stop_grace_secs(),
        }
    }
}

impl ReindexSection {
    #[must_use]
    pub fn to_reindex_config(&self) -> ReindexConfig {
        ReindexConfig {
            workers: self.workers,
            bulk_batch_size: self.bulk_batch_size,
            reconcile_page_size: self.reconcile_page_size,
            delete_timeouts: self
                .delete_timeouts_secs
                .iter()
                .map(|secs| Duration::from_secs(*secs))
                .collect(),
            scan: ScanConfig {
                list_page_size: self.list_page_size,
                poll_interval: Duration::from_millis(self.poll_interval_ms),
                queue_capacity: Some(self.queue_capacity),
            },
        }
    }

    #[must_use]
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterSection {
    #[serde(default = "default_writer_workers")]
    pub workers: usize,
    #[serde(default = "default_writer_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl Default for WriterSection {
    fn default() -> Self {
        Self {
            workers: default_writer_workers(),
            queue_capacity: default_writer_queue_capacity(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl WriterSection {
    #[must_use]
    pub fn to_writer_config(&self) -> WriterConfig {
        WriterConfig {
            workers: self.workers,
            queue_capacity: self.queue_capacity,
            shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSection {
    pub kind: String,
    pub application: String,
    pub index_id: String,
    pub version: String,
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default)]
    pub mapping: IndexMapping,
}

impl CollectionSection {
    pub fn identity(&self) -> Result<IndexIdentity> {
        Ok(IndexIdentity::new(
            self.application.as_str(),
            self.index_id.as_str(),
            self.version.as_str(),
        )?)
    }

    pub fn to_registration(&self) -> Result<CollectionRegistration> {
        let kind = CollectionKind::new(self.kind.as_str())?;
        // A bad extension fails at load time.
        ObjectKey::new(kind.clone(), "sample", self.extension.as_str())?;
        Ok(CollectionRegistration::json(
            kind,
            self.identity()?,
            self.extension.as_str(),
            self.mapping.clone(),
        ))
    }
}

impl SyncConfig {
    /// Read and validate a TOML file. Relative paths resolve against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&raw)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let reindex = &self.reindex;
        for (name, value) in [
            ("reindex.workers", reindex.workers),
            ("reindex.queue_capacity", reindex.queue_capacity),
            ("reindex.list_page_size", reindex.list_page_size),
            ("reindex.bulk_batch_size", reindex.bulk_batch_size),
            ("reindex.reconcile_page_size", reindex.reconcile_page_size),
            ("writer.workers", self.writer.workers),
            ("writer.queue_capacity", self.writer.queue_capacity),
            ("search.max_result_window", self.search.max_result_window),
        ] {
            if value == 0 {
                return Err(IndexerError::InvalidConfig(format!("{name} must be positive")));
            }
        }
        if reindex.delete_timeouts_secs.is_empty() {
            return Err(IndexerError::InvalidConfig(
                "reindex.delete_timeouts_secs must list at least one attempt".to_string(),
            ));
        }
        if reindex.poll_interval_ms == 0 || reindex.batch_timeout_secs == 0 {
            return Err(IndexerError::InvalidConfig(
                "reindex intervals must be positive".to_string(),
            ));
        }

        let mut kinds = BTreeSet::new();
        let mut aliases = BTreeSet::new();
        for collection in &self.collections {
            if !kinds.insert(collection.kind.as_str()) {
                return Err(IndexerError::InvalidConfig(format!(
                    "collection {} is declared twice",
                    collection.kind
                )));
            }
            let registration = collection.to_registration().map_err(|err| {
                IndexerError::InvalidConfig(format!("collection {}: {err}", collection.kind))
            })?;
            if !aliases.insert(registration.alias()) {
                return Err(IndexerError::InvalidConfig(format!(
                    "collection {}: alias {} is already used by another collection",
                    collection.kind,
                    registration.alias()
                )));
            }
        }
        Ok(())
    }

    /// Register every configured collection.
    pub fn build_registry(&self) -> Result<CollectionRegistry> {
        let registry = CollectionRegistry::new();
        for collection in &self.collections {
            registry.register(collection.to_registration()?)?;
        }
        Ok(registry)
    }

    fn resolve_paths(&mut self, base: &Path) {
        if self.store.root.is_relative() {
            self.store.root = base.join(&self.store.root);
        }
        if self.search.snapshot_path.is_relative() {
            self.search.snapshot_path = base.join(&self.search.snapshot_path);
        }
    }
}

fn default_store_root() -> PathBuf {
    PathBuf::from("data/objects")
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("data/search.json")
}

fn default_max_result_window() -> usize {
    DEFAULT_MAX_RESULT_WINDOW
}

fn default_reindex_workers() -> usize {
    DEFAULT_REINDEX_WORKERS
}

fn default_queue_capacity() -> usize {
    DEFAULT_REINDEX_WORKERS * 4
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_list_page_size() -> usize {
    DEFAULT_LIST_PAGE_SIZE
}

fn default_bulk_batch_size() -> usize {
    DEFAULT_BULK_BATCH_SIZE
}

fn default_reconcile_page_size() -> usize {
    crate::reconcile::DEFAULT_RECONCILE_PAGE_SIZE
}

fn default_delete_timeouts_secs() -> Vec<u64> {
    vec![120, 180, 240, 300, 360]
}

fn default_batch_timeout_secs() -> u64 {
    DEFAULT_BATCH_TIMEOUT.as_secs()
}

fn default_stop_grace_secs() -> u64 {
    DEFAULT_STOP_GRACE.as_secs()
}

fn default_writer_workers() -> usize {
    4
}

fn default_writer_queue_capacity() -> usize {
    1024
}

fn default_shutdown_timeout_ms() -> u64 {
    5000
}

fn default_extension() -> String {
    "json".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_search::FieldType;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[store]
root = "objects"

[search]
snapshot_path = "state/search.json"

[reindex]
workers = 2
delete_timeouts_secs = [1, 2]

[[collections]]
kind = "library-patron"
application = "library"
index_id = "patron"
version = "v1"
[collections.mapping]
name = "text"
card = "keyword"
"#;

    #[test]
    fn empty_file_uses_defaults() {
        let config = SyncConfig::from_toml("").unwrap();
        assert_eq!(config.reindex.workers, 8);
        assert_eq!(config.reindex.queue_capacity, 32);
        assert_eq!(config.reindex.bulk_batch_size, 500);
        assert_eq!(config.reindex.delete_timeouts_secs, vec![120, 180, 240, 300, 360]);
        assert_eq!(config.reindex.batch_timeout(), Duration::from_secs(3600));
        assert_eq!(config.reindex.stop_grace(), Duration::from_secs(30));
        assert_eq!(config.writer.queue_capacity, 1024);
        assert_eq!(config.search.max_result_window, 10_000);
        assert!(config.collections.is_empty());
    }

    #[test]
    fn load_resolves_paths_and_builds_registry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docsync.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = SyncConfig::load(&path).unwrap();
        assert_eq!(config.store.root, dir.path().join("objects"));
        assert_eq!(config.search.snapshot_path, dir.path().join("state/search.json"));

        let reindex = config.reindex.to_reindex_config();
        assert_eq!(reindex.workers, 2);
        assert_eq!(
            reindex.delete_timeouts,
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );

        let registry = config.build_registry().unwrap();
        let registration = registry
            .get(&CollectionKind::new("library-patron").unwrap())
            .unwrap();
        assert_eq!(registration.alias(), "library:patron:v1");
        assert_eq!(registration.key_convention.extension, "json");
        assert_eq!(
            registration.mapping,
            IndexMapping::new()
                .with_field("name", FieldType::Text)
                .with_field("card", FieldType::Keyword)
        );
    }

    #[test]
    fn rejects_zero_workers_and_empty_schedule() {
        assert!(matches!(
            SyncConfig::from_toml("[reindex]\nworkers = 0\n"),
            Err(IndexerError::InvalidConfig(_))
        ));
        assert!(matches!(
            SyncConfig::from_toml("[reindex]\ndelete_timeouts_secs = []\n"),
            Err(IndexerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_duplicate_kinds_and_bad_identities() {
        let duplicate = format!(
            "{SAMPLE}\n[[collections]]\nkind = \"library-patron\"\napplication = \"x\"\nindex_id = \"y\"\nversion = \"v1\"\n"
        );
        assert!(matches!(
            SyncConfig::from_toml(&duplicate),
            Err(IndexerError::InvalidConfig(_))
        ));

        let bad_identity = "[[collections]]\nkind = \"k\"\napplication = \"a:b\"\nindex_id = \"i\"\nversion = \"v1\"\n";
        assert!(matches!(
            SyncConfig::from_toml(bad_identity),
            Err(IndexerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_two_collections_sharing_an_alias() {
        let shared = format!(
            "{SAMPLE}\n[[collections]]\nkind = \"library-member\"\napplication = \"library\"\nindex_id = \"patron\"\nversion = \"v1\"\n"
        );
        match SyncConfig::from_toml(&shared) {
            Err(IndexerError::InvalidConfig(message)) => {
                assert!(message.contains("library:patron:v1"), "{message}");
            }
            other => panic!("shared alias accepted: {other:?}"),
        }

        let versioned = format!(
            "{SAMPLE}\n[[collections]]\nkind = \"library-member\"\napplication = \"library\"\nindex_id = \"patron\"\nversion = \"v2\"\n"
        );
        assert!(SyncConfig::from_toml(&versioned).is_ok());
    }

    #[test]
    fn unknown_fields_are_a_parse_error() {
        assert!(matches!(
            SyncConfig::from_toml("[reindexx]\nworkers = 1\n"),
            Err(IndexerError::ConfigError(_))
        ));
    }
}
