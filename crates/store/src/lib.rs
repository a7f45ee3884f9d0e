//! # Docsync Store
//!
//! The authoritative object store as seen by the sync engine.
//!
//! Objects are addressed by [`ObjectKey`] (`{kind}/{id}.{extension}`) and
//! grouped into collections by [`CollectionKind`]. The engine only needs
//! put/get/exists/delete by key and paged listing of one kind; anything that
//! can provide those implements [`ObjectStore`].
//!
//! Two stores ship with the crate:
//!
//! - [`MemoryObjectStore`] - in-process, with failure injection for tests
//! - [`FsObjectStore`] - one directory per kind under a root directory

mod error;
mod fs;
mod key;
mod memory;

pub use error::{Result, StoreError};
pub use fs::FsObjectStore;
pub use key::{CollectionKind, ObjectKey};
pub use memory::MemoryObjectStore;

use async_trait::async_trait;

pub const DEFAULT_LIST_PAGE_SIZE: usize = 1000;

/// One page of a kind listing.
#[derive(Debug, Clone, Default)]
pub struct KeyPage {
    pub keys: Vec<ObjectKey>,
    /// Opaque cursor for the next page; `None` when the listing is exhausted.
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &ObjectKey, bytes: Vec<u8>) -> Result<()>;

    /// Fails with [`StoreError::NotFound`] when the object is absent.
    async fn get(&self, key: &ObjectKey) -> Result<Vec<u8>>;

    async fn exists(&self, key: &ObjectKey) -> Result<bool>;

    /// Returns whether the object existed.
    async fn delete(&self, key: &ObjectKey) -> Result<bool>;

    /// List keys of `kind` in store order, starting after `cursor`.
    async fn list_page(
        &self,
        kind: &CollectionKind,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<KeyPage>;

    /// Drain every page of a kind. Only suitable for small collections.
    async fn list(&self, kind: &CollectionKind) -> Result<Vec<ObjectKey>> {
        let mut keys = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .list_page(kind, cursor.as_deref(), DEFAULT_LIST_PAGE_SIZE)
                .await?;
            keys.extend(page.keys);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(keys)
    }
}
