use crate::record::{JsonCodec, RecordCodec};
use crate::{IndexerError, Result};
use docsync_search::{IndexIdentity, IndexMapping};
use docsync_store::{CollectionKind, ObjectKey};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// How object ids map back to store keys for a kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyConvention {
    pub extension: String,
}

impl KeyConvention {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }

    pub fn key_for(&self, kind: &CollectionKind, id: &str) -> Result<ObjectKey> {
        Ok(ObjectKey::new(kind.clone(), id, self.extension.as_str())?)
    }
}

/// Everything the engine needs to keep one kind in sync.
#[derive(Clone)]
pub struct CollectionRegistration {
    pub kind: CollectionKind,
    pub identity: IndexIdentity,
    pub key_convention: KeyConvention,
    pub mapping: IndexMapping,
    pub codec: Arc<dyn RecordCodec>,
}

impl CollectionRegistration {
    pub fn new(
        kind: CollectionKind,
        identity: IndexIdentity,
        key_convention: KeyConvention,
        mapping: IndexMapping,
        codec: Arc<dyn RecordCodec>,
    ) -> Self {
        Self {
            kind,
            identity,
            key_convention,
            mapping,
            codec,
        }
    }

    /// A registration decoding JSON objects through its own mapping.
    pub fn json(
        kind: CollectionKind,
        identity: IndexIdentity,
        extension: impl Into<String>,
        mapping: IndexMapping,
    ) -> Self {
        let codec = Arc::new(JsonCodec::new(mapping.clone()));
        Self::new(kind, identity, KeyConvention::new(extension), mapping, codec)
    }

    #[must_use]
    pub fn alias(&self) -> String {
        self.identity.alias()
    }
}

impl fmt::Debug for CollectionRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionRegistration")
            .field("kind", &self.kind)
            .field("identity", &self.identity)
            .field("key_convention", &self.key_convention)
            .field("mapping", &self.mapping)
            .finish_non_exhaustive()
    }
}

/// Kinds known to the engine. Shared by reference, never global.
#[derive(Debug, Default)]
pub struct CollectionRegistry {
    entries: RwLock<BTreeMap<CollectionKind, CollectionRegistration>>,
}

impl CollectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the kind was already registered with the same
    /// identity; the original entry is kept.
    ///
    /// An identity (and so an alias) belongs to exactly one kind.
    pub fn register(&self, registration: CollectionRegistration) -> Result<bool> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| IndexerError::Other("collection registry lock poisoned".to_string()))?;
        if let Some(existing) = entries.get(&registration.kind) {
            if existing.identity == registration.identity {
                log::debug!("{} already registered as {}", registration.kind, existing.identity);
                return Ok(false);
            }
            return Err(IndexerError::IdentityConflict {
                kind: registration.kind.clone(),
                registered: existing.identity.alias(),
                requested: registration.identity.alias(),
            });
        }
        if let Some(owner) = entries
            .values()
            .find(|entry| entry.identity == registration.identity)
        {
            return Err(IndexerError::AliasInUse {
                alias: registration.alias(),
                owner: owner.kind.clone(),
                requested: registration.kind.clone(),
            });
        }
        log::info!("Registered {} -> {}", registration.kind, registration.identity);
        entries.insert(registration.kind.clone(), registration);
        Ok(true)
    }

    #[must_use]
    pub fn get(&self, kind: &CollectionKind) -> Option<CollectionRegistration> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(kind).cloned())
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<CollectionKind> {
        self.entries
            .read()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_reindexable(&self, kind: &CollectionKind) -> bool {
        self.get(kind).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_search::FieldType;
    use pretty_assertions::assert_eq;

    fn registration(kind: &str, version: &str) -> CollectionRegistration {
        CollectionRegistration::json(
            CollectionKind::new(kind).unwrap(),
            IndexIdentity::new("library", kind, version).unwrap(),
            "json",
            IndexMapping::new().with_field("name", FieldType::Text),
        )
    }

    #[test]
    fn register_is_idempotent_for_same_identity() {
        let registry = CollectionRegistry::new();
        assert!(registry.register(registration("patron", "v1")).unwrap());
        assert!(!registry.register(registration("patron", "v1")).unwrap());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn conflicting_identity_is_rejected_and_original_kept() {
        let registry = CollectionRegistry::new();
        registry.register(registration("patron", "v1")).unwrap();
        let err = registry.register(registration("patron", "v2")).unwrap_err();
        assert!(matches!(err, IndexerError::IdentityConflict { .. }));

        let kind = CollectionKind::new("patron").unwrap();
        assert_eq!(registry.get(&kind).unwrap().alias(), "library:patron:v1");
    }

    #[test]
    fn identity_cannot_be_shared_between_kinds() {
        let registry = CollectionRegistry::new();
        registry.register(registration("patron", "v1")).unwrap();
        let shared = CollectionRegistration::json(
            CollectionKind::new("member").unwrap(),
            IndexIdentity::new("library", "patron", "v1").unwrap(),
            "json",
            IndexMapping::new(),
        );

        let err = registry.register(shared).unwrap_err();
        match err {
            IndexerError::AliasInUse {
                alias,
                owner,
                requested,
            } => {
                assert_eq!(alias, "library:patron:v1");
                assert_eq!(owner.as_str(), "patron");
                assert_eq!(requested.as_str(), "member");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_reindexable(&CollectionKind::new("member").unwrap()));
    }

    #[test]
    fn unknown_kind_is_not_reindexable() {
        let registry = CollectionRegistry::new();
        registry.register(registration("patron", "v1")).unwrap();
        assert!(registry.is_reindexable(&CollectionKind::new("patron").unwrap()));
        assert!(!registry.is_reindexable(&CollectionKind::new("loan").unwrap()));
        assert_eq!(
            registry.kinds(),
            vec![CollectionKind::new("patron").unwrap()]
        );
    }

    #[test]
    fn key_convention_builds_store_keys() {
        let convention = KeyConvention::new("json");
        let kind = CollectionKind::new("patron").unwrap();
        assert_eq!(convention.key_for(&kind, "p1").unwrap().path(), "patron/p1.json");
        assert!(convention.key_for(&kind, "a/b").is_err());
    }
}
