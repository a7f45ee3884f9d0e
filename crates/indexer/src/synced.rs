use crate::record::SyncRecord;
use crate::registry::CollectionRegistration;
use crate::writer::AsyncWriter;
use crate::{IndexerError, Result};
use docsync_store::{ObjectKey, ObjectStore};
use std::sync::Arc;

/// Writes to the store first, then mirrors the change into search.
///
/// The store write is awaited and its errors propagate; the search write is
/// only queued. A rejected search write leaves the document to the next
/// reindex or reconcile pass.
pub struct SyncedCollection {
    registration: CollectionRegistration,
    store: Arc<dyn ObjectStore>,
    writer: AsyncWriter,
}

impl SyncedCollection {
    pub fn new(
        registration: CollectionRegistration,
        store: Arc<dyn ObjectStore>,
        writer: AsyncWriter,
    ) -> Self {
        Self {
            registration,
            store,
            writer,
        }
    }

    #[must_use]
    pub fn registration(&self) -> &CollectionRegistration {
        &self.registration
    }

    pub async fn save(&self, record: &dyn SyncRecord) -> Result<()> {
        let key = record.object_key();
        self.check_kind(key)?;
        self.store.put(key, record.to_bytes()).await?;
        self.writer
            .upsert(self.registration.alias(), record.to_document())?;
        Ok(())
    }

    /// Decode raw bytes with the collection's codec, then [`save`](Self::save).
    pub async fn save_bytes(&self, key: &ObjectKey, bytes: &[u8]) -> Result<()> {
        let record = self.registration.codec.decode(key, bytes)?;
        self.save(record.as_ref()).await
    }

    /// Returns whether the object existed in the store.
    pub async fn remove(&self, key: &ObjectKey) -> Result<bool> {
        self.check_kind(key)?;
        let existed = self.store.delete(key).await?;
        self.writer.delete(self.registration.alias(), key.id())?;
        Ok(existed)
    }

    fn check_kind(&self, key: &ObjectKey) -> Result<()> {
        if key.kind() != &self.registration.kind {
            return Err(IndexerError::Other(format!(
                "{key} does not belong to {}",
                self.registration.kind
            )));
        }
        Ok(())
    }
}
