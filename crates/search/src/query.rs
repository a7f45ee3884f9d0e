use crate::{Result, SearchError};
use serde_json::{Map, Value};

pub const MATCH_ALL: &str = "*";

/// Request for one page of hits, sorted by document id ascending.
///
/// `from`/`size` paging is bounded by the engine's result window;
/// `search_after` paging (hits with an id greater than the cursor) is not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: String,
    pub from: usize,
    pub size: usize,
    pub search_after: Option<String>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, size: usize) -> Self {
        Self {
            query: query.into(),
            from: 0,
            size,
            search_after: None,
        }
    }

    #[must_use]
    pub fn match_all(size: usize) -> Self {
        Self::new(MATCH_ALL, size)
    }

    #[must_use]
    pub fn starting_at(mut self, from: usize) -> Self {
        self.from = from;
        self
    }

    #[must_use]
    pub fn after(mut self, id: impl Into<String>) -> Self {
        self.search_after = Some(id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub index: String,
    pub id: String,
    pub source: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    /// Total matching documents, independent of paging.
    pub total: u64,
    pub hits: Vec<SearchHit>,
}

impl SearchPage {
    #[must_use]
    pub fn last_id(&self) -> Option<&str> {
        self.hits.last().map(|hit| hit.id.as_str())
    }
}

/// Minimal query syntax understood by the in-memory engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Matcher {
    All,
    Term { field: String, value: String },
    Text(String),
}

impl Matcher {
    pub(crate) fn parse(query: &str) -> Result<Self> {
        let query = query.trim();
        if query.is_empty() || query == MATCH_ALL {
            return Ok(Self::All);
        }
        if let Some((field, value)) = query.split_once(':') {
            let field = field.trim();
            let value = value.trim();
            if field.is_empty() || value.is_empty() {
                return Err(SearchError::InvalidQuery(format!(
                    "{query:?} needs both a field and a value"
                )));
            }
            return Ok(Self::Term {
                field: field.to_string(),
                value: value.to_string(),
            });
        }
        Ok(Self::Text(query.to_lowercase()))
    }

    pub(crate) fn matches(&self, fields: &Map<String, Value>) -> bool {
        match self {
            Self::All => true,
            Self::Term { field, value } => fields.get(field).is_some_and(|v| match v {
                Value::String(s) => s == value,
                other => other.to_string() == *value,
            }),
            Self::Text(needle) => fields.values().any(|v| {
                v.as_str()
                    .is_some_and(|s| s.to_lowercase().contains(needle.as_str()))
            }),
        }
    }
}
