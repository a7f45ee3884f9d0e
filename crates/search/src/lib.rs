//! # Docsync Search
//!
//! The search engine as seen by the sync engine: physical indices, aliases
//! that queries read through, and the document shape written into them.
//!
//! ## Naming
//!
//! ```text
//! IndexIdentity    library:patron:v1                  (alias, stable)
//!     │
//!     └──> IndexGeneration  library:patron:v1_1700000000000  (physical, one per rebuild)
//! ```
//!
//! [`MemorySearchBackend`] implements [`SearchBackend`] in-process and can be
//! persisted to a JSON snapshot between runs.

mod backend;
mod error;
mod identity;
mod mapping;
mod memory;
mod query;
mod snapshot;

pub use backend::{AliasAction, BulkFailure, BulkSummary, SearchBackend};
pub use error::{Result, SearchError};
pub use identity::{IndexGeneration, IndexIdentity};
pub use mapping::{FieldType, IndexMapping, SearchDocument};
pub use memory::{MemorySearchBackend, DEFAULT_MAX_RESULT_WINDOW};
pub use query::{SearchHit, SearchPage, SearchQuery, MATCH_ALL};
pub use snapshot::SNAPSHOT_SCHEMA_VERSION;
