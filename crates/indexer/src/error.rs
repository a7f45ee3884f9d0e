use docsync_store::CollectionKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Store error: {0}")]
    StoreError(#[from] docsync_store::StoreError),

    #[error("Search error: {0}")]
    SearchError(#[from] docsync_search::SearchError),

    #[error("Codec error: {0}")]
    CodecError(#[from] crate::record::CodecError),

    #[error("Config error: {0}")]
    ConfigError(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Collection {0} is not registered")]
    UnknownCollection(CollectionKind),

    #[error("Collection {kind} is registered as {registered}, refusing {requested}")]
    IdentityConflict {
        kind: CollectionKind,
        registered: String,
        requested: String,
    },

    #[error("Alias {alias} already belongs to collection {owner}, refusing {requested}")]
    AliasInUse {
        alias: String,
        owner: CollectionKind,
        requested: CollectionKind,
    },

    #[error("Write rejected: {0}")]
    WriteRejected(#[from] crate::writer::WriteRejected),

    #[error("Cancelled before {0}")]
    Cancelled(String),

    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    #[error("{0}")]
    Other(String),
}
