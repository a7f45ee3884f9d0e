//! Stored objects as the sync engine understands them.
//!
//! A record must be both [`Storable`] (it knows its key and bytes) and
//! [`Indexable`] (it can produce a search document). A [`RecordCodec`] turns
//! raw store bytes into a [`SyncRecord`], or says why it cannot.

use docsync_search::{IndexMapping, SearchDocument};
use docsync_store::ObjectKey;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("{key} is malformed: {reason}")]
    Malformed { key: String, reason: String },

    #[error("{key} is not {capability}")]
    MissingCapability { key: String, capability: Capability },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Storable,
    Indexable,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storable => f.write_str("storable"),
            Self::Indexable => f.write_str("indexable"),
        }
    }
}

pub trait Storable: Send + Sync {
    fn object_key(&self) -> &ObjectKey;

    fn to_bytes(&self) -> Vec<u8>;
}

pub trait Indexable: Send + Sync {
    fn to_document(&self) -> SearchDocument;
}

pub trait SyncRecord: Storable + Indexable {}

impl<T: Storable + Indexable> SyncRecord for T {}

pub trait RecordCodec: Send + Sync {
    fn decode(&self, key: &ObjectKey, bytes: &[u8]) -> Result<Box<dyn SyncRecord>, CodecError>;
}

/// JSON objects projected through an index mapping.
///
/// An object is storable when it is a JSON object whose optional `"id"` field
/// agrees with its key, and indexable when at least one mapped field survives
/// projection.
#[derive(Debug, Clone, Default)]
pub struct JsonCodec {
    mapping: IndexMapping,
}

impl JsonCodec {
    #[must_use]
    pub fn new(mapping: IndexMapping) -> Self {
        Self { mapping }
    }
}

impl RecordCodec for JsonCodec {
    fn decode(&self, key: &ObjectKey, bytes: &[u8]) -> Result<Box<dyn SyncRecord>, CodecError> {
        let value: Value = serde_json::from_slice(bytes).map_err(|err| CodecError::Malformed {
            key: key.path(),
            reason: err.to_string(),
        })?;
        let record = JsonRecord::from_value(key.clone(), value, &self.mapping)?;
        Ok(Box::new(record))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonRecord {
    key: ObjectKey,
    body: Map<String, Value>,
    fields: Map<String, Value>,
}

impl JsonRecord {
    pub fn from_value(
        key: ObjectKey,
        value: Value,
        mapping: &IndexMapping,
    ) -> Result<Self, CodecError> {
        let Value::Object(body) = value else {
            return Err(CodecError::MissingCapability {
                key: key.path(),
                capability: Capability::Storable,
            });
        };
        match body.get("id") {
            None => {}
            Some(Value::String(id)) if id == key.id() => {}
            Some(other) => {
                return Err(CodecError::Malformed {
                    key: key.path(),
                    reason: format!("id field {other} does not match key id {}", key.id()),
                })
            }
        }
        let fields = mapping.project(&body);
        if fields.is_empty() {
            return Err(CodecError::MissingCapability {
                key: key.path(),
                capability: Capability::Indexable,
            });
        }
        Ok(Self { key, body, fields })
    }

    #[must_use]
    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }
}

impl Storable for JsonRecord {
    fn object_key(&self) -> &ObjectKey {
        &self.key
    }

    fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.body).unwrap_or_default()
    }
}

impl Indexable for JsonRecord {
    fn to_document(&self) -> SearchDocument {
        SearchDocument::new(self.key.id(), self.fields.clone())
    }
}
