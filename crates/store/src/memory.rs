use crate::{CollectionKind, KeyPage, ObjectKey, ObjectStore, Result, StoreError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::Mutex;
use tokio::sync::RwLock;

/// In-process object store.
///
/// Listing order is key order. Failures can be injected per operation so the
/// sync engine's partial-failure paths can be exercised without a network.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<ObjectKey, Vec<u8>>>,
    faults: Mutex<Faults>,
}

#[derive(Default)]
struct Faults {
    fail_listing: bool,
    fail_get: HashSet<String>,
    fail_exists: HashSet<String>,
}

impl MemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Make every `list_page` call fail until reset.
    pub fn set_list_failure(&self, fail: bool) {
        self.with_faults(|f| f.fail_listing = fail);
    }

    /// Make `get` fail for objects with this id.
    pub fn fail_get_for(&self, id: impl Into<String>) {
        let id = id.into();
        self.with_faults(|f| {
            f.fail_get.insert(id);
        });
    }

    /// Make `exists` fail for objects with this id.
    pub fn fail_exists_for(&self, id: impl Into<String>) {
        let id = id.into();
        self.with_faults(|f| {
            f.fail_exists.insert(id);
        });
    }

    pub fn clear_faults(&self) {
        self.with_faults(|f| *f = Faults::default());
    }

    fn with_faults<R>(&self, apply: impl FnOnce(&mut Faults) -> R) -> R {
        let mut guard = match self.faults.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        apply(&mut guard)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &ObjectKey, bytes: Vec<u8>) -> Result<()> {
        self.objects.write().await.insert(key.clone(), bytes);
        Ok(())
    }

    async fn get(&self, key: &ObjectKey) -> Result<Vec<u8>> {
        if self.with_faults(|f| f.fail_get.contains(key.id())) {
            return Err(StoreError::Unavailable(format!("injected get failure for {key}")));
        }
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn exists(&self, key: &ObjectKey) -> Result<bool> {
        if self.with_faults(|f| f.fail_exists.contains(key.id())) {
            return Err(StoreError::Unavailable(format!(
                "injected exists failure for {key}"
            )));
        }
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn delete(&self, key: &ObjectKey) -> Result<bool> {
        Ok(self.objects.write().await.remove(key).is_some())
    }

    async fn list_page(
        &self,
        kind: &CollectionKind,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<KeyPage> {
        if self.with_faults(|f| f.fail_listing) {
            return Err(StoreError::Unavailable(format!(
                "injected listing failure for {kind}"
            )));
        }
        let limit = limit.max(1);
        let lower = match cursor {
            Some(file_name) => {
                Bound::Excluded(ObjectKey::from_file_name(kind.clone(), file_name)?)
            }
            None => Bound::Unbounded,
        };

        let objects = self.objects.read().await;
        let mut keys: Vec<ObjectKey> = objects
            .range((lower, Bound::Unbounded))
            .map(|(key, _)| key)
            .skip_while(|key| key.kind() < kind)
            .take_while(|key| key.kind() == kind)
            .take(limit + 1)
            .cloned()
            .collect();

        let next_cursor = if keys.len() > limit {
            keys.truncate(limit);
            keys.last().map(ObjectKey::file_name)
        } else {
            None
        };
        Ok(KeyPage { keys, next_cursor })
    }
}
