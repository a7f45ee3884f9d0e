use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Index already exists: {0}")]
    IndexAlreadyExists(String),

    #[error("Alias {alias} must resolve to exactly one index for writes, found {targets}")]
    AmbiguousWriteTarget { alias: String, targets: usize },

    #[error("Result window too large: from + size = {requested}, max is {max}")]
    ResultWindowExceeded { requested: usize, max: usize },

    #[error("Invalid index identity: {0}")]
    InvalidIdentity(String),

    #[error("Invalid alias action: {0}")]
    InvalidAliasAction(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Search engine unavailable: {0}")]
    Unavailable(String),
}
