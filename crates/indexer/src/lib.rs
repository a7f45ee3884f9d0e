//! # Docsync Indexer
//!
//! Keeps a search engine consistent with an authoritative object store.
//!
//! ## Pipeline
//!
//! ```text
//! ObjectStore (source of truth)
//!     │
//!     ├──> CollectionScanner (lister + bounded worker pool)
//!     │      └─> RecordCodec -> SearchDocument batches
//!     │
//!     ├──> Reindexer (new generation, backfill, atomic alias swap)
//!     │      └─> Reconciler (drop documents whose object is gone)
//!     │
//!     └──> SyncedCollection (store write + queued search write)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use docsync_indexer::{CollectionRegistration, Reindexer};
//! use docsync_search::{FieldType, IndexIdentity, IndexMapping, MemorySearchBackend};
//! use docsync_store::{CollectionKind, FsObjectStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registration = CollectionRegistration::json(
//!         CollectionKind::new("library-patron")?,
//!         IndexIdentity::new("library", "patron", "v1")?,
//!         "json",
//!         IndexMapping::new().with_field("name", FieldType::Text),
//!     );
//!     let store = Arc::new(FsObjectStore::new("/var/lib/objects"));
//!     let search = Arc::new(MemorySearchBackend::new());
//!
//!     let report = Reindexer::new(store, search).reindex(&registration).await;
//!     println!("{:?}: {} documents", report.state, report.documents_indexed);
//!     Ok(())
//! }
//! ```

mod config;
mod coordinator;
mod error;
mod job;
mod pool;
mod reconcile;
mod record;
mod registry;
mod reindex;
mod scanner;
mod stats;
mod synced;
mod writer;

pub use config::{
    CollectionSection, ReindexSection, SearchSection, StoreSection, SyncConfig, WriterSection,
};
pub use coordinator::{BatchReport, SyncCoordinator, DEFAULT_BATCH_TIMEOUT, DEFAULT_STOP_GRACE};
pub use error::{IndexerError, Result};
pub use job::{JobState, ReindexJob, ReindexReport, REINDEX_REPORT_SCHEMA_VERSION};
pub use pool::{
    Heartbeat, LogHeartbeat, PoolConfig, PoolReport, StopSignal, Task, TaskContext, TaskOutcome,
    TaskPool, DEFAULT_POLL_INTERVAL,
};
pub use reconcile::{ReconcileReport, Reconciler, DEFAULT_RECONCILE_PAGE_SIZE};
pub use record::{
    Capability, CodecError, Indexable, JsonCodec, JsonRecord, RecordCodec, Storable, SyncRecord,
};
pub use registry::{CollectionRegistration, CollectionRegistry, KeyConvention};
pub use reindex::{
    ReindexConfig, Reindexer, DEFAULT_BULK_BATCH_SIZE, DEFAULT_DELETE_TIMEOUTS,
    DEFAULT_REINDEX_WORKERS,
};
pub use scanner::{CollectionScanner, ScanConfig, ScanHandler, ScanReport};
pub use stats::PoolProgress;
pub use synced::SyncedCollection;
pub use writer::{AsyncWriter, ShutdownReport, WriteRejected, WriterConfig, WriterHealth};
