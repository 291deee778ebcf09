//! Vector store wire types.
//!
//! These mirror the Pinecone control-plane and data-plane payloads closely
//! enough to be serialized directly onto the wire.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Metadata attached to a vector: string keys to JSON scalars.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Distance metric of an index. Fixed at creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    Euclidean,
    Dotproduct,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
            Self::Dotproduct => "dotproduct",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration of an index, as sent on create and returned by describe.
///
/// Provider-specific fields are optional; on recreation every field that was
/// present is sent back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,

    pub dimension: u32,

    #[serde(default)]
    pub metric: Metric,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shards: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pods: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_collection: Option<String>,

    /// Which metadata fields are indexed, e.g. `{"indexed": ["genre"]}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_config: Option<serde_json::Value>,
}

impl IndexSpec {
    /// Spec for a brand-new index with provider defaults for everything else.
    pub fn new(name: impl Into<String>, dimension: u32, metric: Metric) -> Self {
        Self {
            name: name.into(),
            dimension,
            metric,
            replicas: None,
            shards: None,
            pods: None,
            pod_type: None,
            source_collection: None,
            metadata_config: None,
        }
    }
}

/// Readiness status reported by describe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatus {
    #[serde(default)]
    pub ready: bool,

    #[serde(default)]
    pub state: String,

    /// Data-plane host of the index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ready: {}, state: {}}}", self.ready, self.state)
    }
}

/// Full description of a remote index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    #[serde(rename = "database")]
    pub spec: IndexSpec,

    #[serde(default)]
    pub status: IndexStatus,
}

/// Per-namespace vector counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceStats {
    #[serde(default)]
    pub vector_count: u64,
}

/// Aggregate stats of an index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    #[serde(default)]
    pub dimension: u32,

    #[serde(default)]
    pub index_fullness: f32,

    #[serde(default)]
    pub total_vector_count: u64,

    #[serde(default)]
    pub namespaces: HashMap<String, NamespaceStats>,
}

/// One vector to upsert: `(id, values, metadata)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,

    pub values: Vec<f32>,

    #[serde(default)]
    pub metadata: Metadata,
}

impl VectorRecord {
    pub fn new(id: impl Into<String>, values: Vec<f32>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            values,
            metadata,
        }
    }
}
