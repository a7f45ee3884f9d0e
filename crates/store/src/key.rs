use crate::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a class of stored objects, e.g. `library-patron`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionKind(String);

impl CollectionKind {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(StoreError::InvalidKind("kind must not be empty".into()));
        }
        if name.contains('/') {
            return Err(StoreError::InvalidKind(format!(
                "kind {name:?} must not contain '/'"
            )));
        }
        Ok(Self(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CollectionKind {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<CollectionKind> for String {
    fn from(kind: CollectionKind) -> Self {
        kind.0
    }
}

/// Identifies one stored object: `{kind}/{id}.{extension}`.
///
/// Keys are created by the store (listing) or by callers that already know the
/// collection's key convention; they are never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    kind: CollectionKind,
    id: String,
    extension: String,
}

impl ObjectKey {
    pub fn new(
        kind: CollectionKind,
        id: impl Into<String>,
        extension: impl Into<String>,
    ) -> Result<Self> {
        let id = id.into();
        let extension = extension.into();
        validate_id(&id)?;
        validate_extension(&extension)?;
        Ok(Self {
            kind,
            id,
            extension,
        })
    }

    /// Parse the `{kind}/{id}.{extension}` path form.
    pub fn parse(path: &str) -> Result<Self> {
        let (kind, file) = path
            .split_once('/')
            .ok_or_else(|| StoreError::InvalidKey(format!("{path:?} has no kind prefix")))?;
        let kind = CollectionKind::new(kind)?;
        Self::from_file_name(kind, file)
    }

    /// Build a key from a file name inside a kind, splitting at the last `.`.
    pub fn from_file_name(kind: CollectionKind, file_name: &str) -> Result<Self> {
        let (id, extension) = file_name.rsplit_once('.').ok_or_else(|| {
            StoreError::InvalidKey(format!("{file_name:?} has no extension"))
        })?;
        Self::new(kind, id, extension)
    }

    #[must_use]
    pub fn kind(&self) -> &CollectionKind {
        &self.kind
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.id, self.extension)
    }

    #[must_use]
    pub fn path(&self) -> String {
        format!("{}/{}.{}", self.kind, self.id, self.extension)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}.{}", self.kind, self.id, self.extension)
    }
}

fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(StoreError::InvalidKey("object id must not be empty".into()));
    }
    if id.contains('/') || id.contains('\\') {
        return Err(StoreError::InvalidKey(format!(
            "object id {id:?} must not contain path separators"
        )));
    }
    if id == "." || id == ".." {
        return Err(StoreError::InvalidKey(format!("object id {id:?} is reserved")));
    }
    Ok(())
}

fn validate_extension(extension: &str) -> Result<()> {
    if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(StoreError::InvalidKey(format!(
            "extension {extension:?} must be non-empty ASCII alphanumeric"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kind(name: &str) -> CollectionKind {
        CollectionKind::new(name).unwrap()
    }

    #[test]
    fn parse_splits_at_last_dot() {
        let key = ObjectKey::parse("library-patron/p.1.json").unwrap();
        assert_eq!(key.kind().as_str(), "library-patron");
        assert_eq!(key.id(), "p.1");
        assert_eq!(key.extension(), "json");
        assert_eq!(key.path(), "library-patron/p.1.json");
    }

    #[test]
    fn rejects_bad_ids_and_extensions() {
        assert!(ObjectKey::new(kind("k"), "", "json").is_err());
        assert!(ObjectKey::new(kind("k"), "a/b", "json").is_err());
        assert!(ObjectKey::new(kind("k"), "..", "json").is_err());
        assert!(ObjectKey::new(kind("k"), "a", "").is_err());
        assert!(ObjectKey::new(kind("k"), "a", "js-on").is_err());
        assert!(ObjectKey::parse("no-kind.json").is_err());
        assert!(ObjectKey::parse("k/no-extension").is_err());
    }

    #[test]
    fn kind_rejects_empty_and_slash() {
        assert!(CollectionKind::new("").is_err());
        assert!(CollectionKind::new("a/b").is_err());
        assert_eq!(kind("books").to_string(), "books");
    }
}
