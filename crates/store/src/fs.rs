use crate::{CollectionKind, KeyPage, ObjectKey, ObjectStore, Result, StoreError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const TMP_SUFFIX: &str = ".tmp";

/// Directory-backed store: `{root}/{kind}/{id}.{extension}`.
///
/// Writes go through a temp file and a rename so a concurrent reader never
/// observes a half-written object. Listing order is file-name order.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn kind_dir(&self, kind: &CollectionKind) -> PathBuf {
        self.root.join(kind.as_str())
    }

    fn object_path(&self, key: &ObjectKey) -> PathBuf {
        self.kind_dir(key.kind()).join(key.file_name())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &ObjectKey, bytes: Vec<u8>) -> Result<()> {
        let path = self.object_path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_file_name(format!("{}{TMP_SUFFIX}", key.file_name()));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn get(&self, key: &ObjectKey) -> Result<Vec<u8>> {
        match tokio::fs::read(self.object_path(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn exists(&self, key: &ObjectKey) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.object_path(key)).await?)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<bool> {
        match tokio::fs::remove_file(self.object_path(key)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn list_page(
        &self,
        kind: &CollectionKind,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<KeyPage> {
        let dir = self.kind_dir(kind);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(KeyPage::default()),
            Err(err) => return Err(err.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || name.ends_with(TMP_SUFFIX) {
                continue;
            }
            if cursor.is_some_and(|after| name.as_str() <= after) {
                continue;
            }
            names.push(name);
        }
        names.sort();

        let limit = limit.max(1);
        let mut keys = Vec::with_capacity(limit.min(names.len()));
        let mut next_cursor = None;
        for name in names {
            if keys.len() == limit {
                next_cursor = keys.last().map(ObjectKey::file_name);
                break;
            }
            match ObjectKey::from_file_name(kind.clone(), &name) {
                Ok(key) => keys.push(key),
                Err(err) => log::warn!("Skipping unrecognised object file {name} in {kind}: {err}"),
            }
        }
        Ok(KeyPage { keys, next_cursor })
    }
}
