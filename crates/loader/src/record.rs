//! Record to vector transformation.
//!
//! Turns one input record (document text, embedding, metadata) into a
//! `VectorRecord` and derives its identifier.

use md5::{Digest, Md5};
use pinesink_core::{AppError, AppResult, SinkConfig};
use pinesink_vector::{Metadata, VectorRecord};
use serde_json::Value;

/// One parsed input record.
pub type Record = serde_json::Map<String, Value>;

/// Which input fields feed which parts of a vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMapping {
    /// Input field holding the document text
    pub text_property: String,

    /// Input field holding the embedding
    pub embeddings_property: String,

    /// Input field holding the metadata mapping
    pub metadata_property: String,

    /// Metadata key that receives the document text
    pub metadata_text_key: String,
}

impl From<&SinkConfig> for RecordMapping {
    fn from(config: &SinkConfig) -> Self {
        Self {
            text_property: config.document_text_property.clone(),
            embeddings_property: config.embeddings_property.clone(),
            metadata_property: config.metadata_property.clone(),
            metadata_text_key: config.pinecone_metadata_text_key.clone(),
        }
    }
}

impl Default for RecordMapping {
    fn default() -> Self {
        Self::from(&SinkConfig::default())
    }
}

impl RecordMapping {
    /// Build the `(id, values, metadata)` triple for a record.
    ///
    /// The record is left untouched: metadata is copied and the document
    /// text merged into the copy.
    pub fn to_vector(&self, record: &Record, key_properties: &[String]) -> AppResult<VectorRecord> {
        let text = self.document_text(record)?;
        let embedding = self.field(record, &self.embeddings_property)?;
        let values = coerce_embedding(embedding, &self.embeddings_property)?;

        let mut metadata = self.metadata(record)?;
        metadata.insert(self.metadata_text_key.clone(), Value::String(text.to_string()));

        let id = if key_properties.is_empty() {
            content_id(text)
        } else {
            composite_id(record, key_properties)?
        };

        Ok(VectorRecord::new(id, values, metadata))
    }

    fn field<'a>(&self, record: &'a Record, name: &str) -> AppResult<&'a Value> {
        record
            .get(name)
            .ok_or_else(|| {
                AppError::Record(format!("Record is missing required field '{}'", name))
            })
    }

    fn document_text<'a>(&self, record: &'a Record) -> AppResult<&'a str> {
        self.field(record, &self.text_property)?
            .as_str()
            .ok_or_else(|| {
                AppError::Record(format!(
                    "Document text field '{}' is not a string",
                    self.text_property
                ))
            })
    }

    fn metadata(&self, record: &Record) -> AppResult<Metadata> {
        match record.get(&self.metadata_property) {
            None | Some(Value::Null) => Ok(Metadata::new()),
            Some(Value::Object(map)) => Ok(map.clone()),
            Some(other) => Err(AppError::Record(format!(
                "Metadata field '{}' is not an object: {}",
                self.metadata_property, other
            ))),
        }
    }
}

/// Hex MD5 of the document text.
///
/// Used for determinism only: the same text always maps to the same id, so
/// re-sending unchanged text overwrites instead of duplicating.
pub fn content_id(text: &str) -> String {
    hex::encode(Md5::digest(text.as_bytes()))
}

/// Key property values joined with `:` in configured order.
///
/// Values are not escaped, so a value containing `:` can collide with a
/// different multi-field key.
pub fn composite_id(record: &Record, key_properties: &[String]) -> AppResult<String> {
    let parts = key_properties
        .iter()
        .map(|key| match record.get(key) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Null) | None => Err(AppError::Record(format!(
                "Record is missing key property '{}'",
                key
            ))),
            Some(Value::Array(_)) | Some(Value::Object(_)) => Err(AppError::Record(format!(
                "Key property '{}' is not a scalar",
                key
            ))),
            Some(other) => Ok(other.to_string()),
        })
        .collect::<AppResult<Vec<String>>>()?;

    Ok(parts.join(":"))
}

/// Coerce an embedding to `f32` components.
///
/// Components may be JSON numbers or numeric strings; anything else is a
/// fatal type error.
pub fn coerce_embedding(value: &Value, field: &str) -> AppResult<Vec<f32>> {
    let items = value.as_array().ok_or_else(|| {
        AppError::Record(format!("Embedding field '{}' is not an array", field))
    })?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let component = match item {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            let component = component.ok_or_else(|| {
                AppError::Record(format!(
                    "Embedding field '{}' component [{}] is not numeric: {}",
                    field, i, item
                ))
            })?;

            let value = component as f32;
            if !value.is_finite() {
                return Err(AppError::Record(format!(
                    "Embedding field '{}' component [{}] is not a finite f32: {}",
                    field, i, item
                )));
            }
            Ok(value)
        })
        .collect()
}
