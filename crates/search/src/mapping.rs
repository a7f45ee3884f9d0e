use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Keyword,
    Text,
    Long,
    Double,
    Boolean,
    Date,
}

impl FieldType {
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Keyword | Self::Text | Self::Date => value.is_string(),
            Self::Long => value.is_i64() || value.is_u64(),
            Self::Double => value.is_number(),
            Self::Boolean => value.is_boolean(),
        }
    }
}

/// Field name → field type for one index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexMapping {
    pub fields: BTreeMap<String, FieldType>,
}

impl IndexMapping {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(name.into(), field_type);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Keep only mapped fields whose value matches the declared type.
    #[must_use]
    pub fn project(&self, source: &Map<String, Value>) -> Map<String, Value> {
        let mut out = Map::new();
        for (name, field_type) in &self.fields {
            match source.get(name) {
                Some(value) if field_type.accepts(value) => {
                    out.insert(name.clone(), value.clone());
                }
                Some(Value::Null) | None => {}
                Some(value) => {
                    log::debug!("Dropping field {name}: {value} is not a {field_type:?}");
                }
            }
        }
        out
    }
}

/// A document as stored in an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl SearchDocument {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}
