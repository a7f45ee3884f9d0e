use crate::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable logical name of a search index: `{application}:{index_id}:{version}`.
///
/// The string form doubles as the alias every query is issued against.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IndexIdentity {
    application: String,
    index_id: String,
    version: String,
}

impl IndexIdentity {
    pub fn new(
        application: impl Into<String>,
        index_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self> {
        let identity = Self {
            application: application.into(),
            index_id: index_id.into(),
            version: version.into(),
        };
        for (label, part) in [
            ("application", &identity.application),
            ("index id", &identity.index_id),
            ("version", &identity.version),
        ] {
            if part.trim().is_empty() {
                return Err(SearchError::InvalidIdentity(format!("{label} must not be empty")));
            }
            if part.contains(':') || part.contains(char::is_whitespace) {
                return Err(SearchError::InvalidIdentity(format!(
                    "{label} {part:?} must not contain ':' or whitespace"
                )));
            }
        }
        Ok(identity)
    }

    pub fn parse(alias: &str) -> Result<Self> {
        let mut parts = alias.split(':');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(app), Some(id), Some(version), None) => Self::new(app, id, version),
            _ => Err(SearchError::InvalidIdentity(format!(
                "{alias:?} is not application:index:version"
            ))),
        }
    }

    #[must_use]
    pub fn alias(&self) -> String {
        self.to_string()
    }

    #[must_use]
    pub fn application(&self) -> &str {
        &self.application
    }

    #[must_use]
    pub fn index_id(&self) -> &str {
        &self.index_id
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Prefix shared by every generation of this identity.
    #[must_use]
    pub fn generation_prefix(&self) -> String {
        format!("{self}_")
    }
}

impl fmt::Display for IndexIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.application, self.index_id, self.version)
    }
}

impl TryFrom<String> for IndexIdentity {
    type Error = SearchError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<IndexIdentity> for String {
    fn from(identity: IndexIdentity) -> Self {
        identity.to_string()
    }
}

/// One physical, timestamp-named build of an identity: `{alias}_{created_at_ms}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexGeneration {
    name: String,
    created_at_ms: u64,
}

impl IndexGeneration {
    #[must_use]
    pub fn new(identity: &IndexIdentity, created_at_ms: u64) -> Self {
        Self {
            name: format!("{}{created_at_ms}", identity.generation_prefix()),
            created_at_ms,
        }
    }

    /// Recognise `name` as a generation of `identity`.
    #[must_use]
    pub fn parse(identity: &IndexIdentity, name: &str) -> Option<Self> {
        let suffix = name.strip_prefix(&identity.generation_prefix())?;
        if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let created_at_ms = suffix.parse().ok()?;
        Some(Self {
            name: name.to_string(),
            created_at_ms,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    /// The generation one millisecond later, used when a name is taken.
    #[must_use]
    pub fn bump(&self, identity: &IndexIdentity) -> Self {
        Self::new(identity, self.created_at_ms.saturating_add(1))
    }
}

impl fmt::Display for IndexGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
