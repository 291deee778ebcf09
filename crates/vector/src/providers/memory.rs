//! In-memory vector store.
//!
//! Keeps indexes and vectors in process memory and records every gateway
//! call in order. Selected with `provider: memory` (or `--dry-run`) and used
//! throughout the test suites to observe what the sink asked for.

use crate::gateway::{VectorStoreGateway, DELETE_MAX_WAIT_SECS, DELETE_POLL_INTERVAL_SECS};
use crate::types::{
    IndexDescriptor, IndexSpec, IndexStats, IndexStatus, NamespaceStats, VectorRecord,
};
use pinesink_core::{AppError, AppResult};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// One recorded gateway call.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    ListIndexes,
    CreateIndex(IndexSpec),
    DeleteIndex(String),
    DescribeIndex(String),
    DescribeIndexStats(String),
    Upsert {
        index: String,
        namespace: Option<String>,
        vectors: Vec<VectorRecord>,
    },
}

impl GatewayCall {
    /// Short operation name, handy for asserting call order.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ListIndexes => "list_indexes",
            Self::CreateIndex(_) => "create_index",
            Self::DeleteIndex(_) => "delete_index",
            Self::DescribeIndex(_) => "describe_index",
            Self::DescribeIndexStats(_) => "describe_index_stats",
            Self::Upsert { .. } => "upsert",
        }
    }
}

/// When a newly created index starts reporting ready.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Readiness {
    #[default]
    Immediate,
    /// Not ready for this many describe calls after creation
    AfterDescribes(u32),
    Never,
}

#[derive(Debug)]
struct MemoryIndex {
    spec: IndexSpec,
    /// Describe calls left before reporting ready; `None` means never
    pending_describes: Option<u32>,
    /// namespace -> id -> vector
    namespaces: HashMap<String, BTreeMap<String, VectorRecord>>,
}

impl MemoryIndex {
    fn vector_count(&self) -> u64 {
        self.namespaces.values().map(|ns| ns.len() as u64).sum()
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    indexes: BTreeMap<String, MemoryIndex>,
    /// Deleted indexes still listed, with the listings left before they vanish
    terminating: BTreeMap<String, u32>,
    calls: Vec<GatewayCall>,
}

/// In-process implementation of `VectorStoreGateway`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    readiness: Readiness,
    /// Listings a deleted index stays visible for
    delete_lag: u32,
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store whose indexes are ready as soon as they exist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with the given readiness behaviour for new indexes.
    pub fn with_readiness(readiness: Readiness) -> Self {
        Self {
            readiness,
            delete_lag: 0,
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Keep deleted indexes listed (and their names taken) for `listings`
    /// more `list_indexes` calls, like a control plane that terminates
    /// indexes in the background.
    pub fn with_delete_lag(mut self, listings: u32) -> Self {
        self.delete_lag = listings;
        self
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a ready index holding `vectors` in the default namespace.
    ///
    /// Not recorded as a call.
    pub fn insert_index(&self, spec: IndexSpec, vectors: Vec<VectorRecord>) {
        let mut default_ns = BTreeMap::new();
        for vector in vectors {
            default_ns.insert(vector.id.clone(), vector);
        }

        let mut namespaces = HashMap::new();
        namespaces.insert(String::new(), default_ns);

        self.state().indexes.insert(
            spec.name.clone(),
            MemoryIndex {
                spec,
                pending_describes: Some(0),
                namespaces,
            },
        );
    }

    /// All recorded calls, oldest first.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state().calls.clone()
    }

    /// Names of the recorded calls, oldest first.
    pub fn call_names(&self) -> Vec<&'static str> {
        self.state().calls.iter().map(GatewayCall::name).collect()
    }

    /// Forget recorded calls (indexes are kept).
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Stored vectors of an index across namespaces, ordered by id.
    pub fn vectors(&self, name: &str) -> Vec<VectorRecord> {
        let state = self.state();
        let Some(index) = state.indexes.get(name) else {
            return Vec::new();
        };

        let mut vectors: Vec<VectorRecord> = index
            .namespaces
            .values()
            .flat_map(|ns| ns.values().cloned())
            .collect();
        vectors.sort_by(|a, b| a.id.cmp(&b.id));
        vectors
    }

    /// Current spec of an index, if it exists.
    pub fn spec(&self, name: &str) -> Option<IndexSpec> {
        self.state().indexes.get(name).map(|index| index.spec.clone())
    }
}

fn not_found(name: &str) -> AppError {
    AppError::VectorStore(format!("Index `{}` not found", name))
}

#[async_trait::async_trait]
impl VectorStoreGateway for MemoryStore {
    fn provider_name(&self) -> &str {
        "memory"
    }

    async fn list_indexes(&self) -> AppResult<BTreeSet<String>> {
        let mut state = self.state();
        state.calls.push(GatewayCall::ListIndexes);

        let mut names: BTreeSet<String> = state.indexes.keys().cloned().collect();
        names.extend(state.terminating.keys().cloned());

        state.terminating.retain(|_, remaining| {
            *remaining -= 1;
            *remaining > 0
        });
        Ok(names)
    }

    async fn create_index(&self, spec: &IndexSpec, _timeout: Duration) -> AppResult<()> {
        let mut state = self.state();
        state.calls.push(GatewayCall::CreateIndex(spec.clone()));

        if state.indexes.contains_key(&spec.name) {
            return Err(AppError::VectorStore(format!(
                "Index `{}` already exists",
                spec.name
            )));
        }
        if state.terminating.contains_key(&spec.name) {
            return Err(AppError::VectorStore(format!(
                "Index `{}` is still being deleted",
                spec.name
            )));
        }
        if spec.dimension == 0 {
            return Err(AppError::VectorStore(
                "Index dimension must be positive".to_string(),
            ));
        }

        let pending_describes = match self.readiness {
            Readiness::Immediate => Some(0),
            Readiness::AfterDescribes(n) => Some(n),
            Readiness::Never => None,
        };

        state.indexes.insert(
            spec.name.clone(),
            MemoryIndex {
                spec: spec.clone(),
                pending_describes,
                namespaces: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> AppResult<()> {
        {
            let mut state = self.state();
            state.calls.push(GatewayCall::DeleteIndex(name.to_string()));

            state.indexes.remove(name).ok_or_else(|| not_found(name))?;
            if self.delete_lag > 0 {
                state.terminating.insert(name.to_string(), self.delete_lag);
            }
        }

        self.wait_until_deleted(
            name,
            Duration::from_secs(DELETE_POLL_INTERVAL_SECS),
            Duration::from_secs(DELETE_MAX_WAIT_SECS),
        )
        .await
    }

    async fn describe_index(&self, name: &str) -> AppResult<IndexDescriptor> {
        let mut state = self.state();
        state.calls.push(GatewayCall::DescribeIndex(name.to_string()));

        let index = state.indexes.get_mut(name).ok_or_else(|| not_found(name))?;

        let ready = match index.pending_describes {
            Some(0) => true,
            Some(remaining) => {
                index.pending_describes = Some(remaining - 1);
                false
            }
            None => false,
        };

        Ok(IndexDescriptor {
            spec: index.spec.clone(),
            status: IndexStatus {
                ready,
                state: if ready { "Ready" } else { "Initializing" }.to_string(),
                host: None,
                port: None,
            },
        })
    }

    async fn describe_index_stats(&self, name: &str) -> AppResult<IndexStats> {
        let mut state = self.state();
        state
            .calls
            .push(GatewayCall::DescribeIndexStats(name.to_string()));

        let index = state.indexes.get(name).ok_or_else(|| not_found(name))?;

        Ok(IndexStats {
            dimension: index.spec.dimension,
            index_fullness: 0.0,
            total_vector_count: index.vector_count(),
            namespaces: index
                .namespaces
                .iter()
                .map(|(ns, vectors)| {
                    (
                        ns.clone(),
                        NamespaceStats {
                            vector_count: vectors.len() as u64,
                        },
                    )
                })
                .collect(),
        })
    }

    async fn upsert(
        &self,
        name: &str,
        namespace: Option<&str>,
        vectors: &[VectorRecord],
    ) -> AppResult<usize> {
        let mut state = self.state();
        state.calls.push(GatewayCall::Upsert {
            index: name.to_string(),
            namespace: namespace.map(str::to_string),
            vectors: vectors.to_vec(),
        });

        let index = state.indexes.get_mut(name).ok_or_else(|| not_found(name))?;

        let dimension = index.spec.dimension as usize;
        if let Some(bad) = vectors.iter().find(|v| v.values.len() != dimension) {
            return Err(AppError::VectorStore(format!(
                "Vector `{}` has dimension {}, index `{}` expects {}",
                bad.id,
                bad.values.len(),
                name,
                dimension
            )));
        }

        let ns = index
            .namespaces
            .entry(namespace.unwrap_or_default().to_string())
            .or_default();
        for vector in vectors {
            ns.insert(vector.id.clone(), vector.clone());
        }

        Ok(vectors.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Metadata, Metric};

    fn vector(id: &str) -> VectorRecord {
        VectorRecord::new(id, vec![1.0, 2.0], Metadata::new())
    }

    #[tokio::test]
    async fn test_create_describe_and_upsert() {
        let store = MemoryStore::new();
        store
            .create_index(&IndexSpec::new("docs", 2, Metric::Cosine), Duration::ZERO)
            .await
            .unwrap();

        assert!(store.index_exists("docs").await.unwrap());
        assert!(store.describe_index("docs").await.unwrap().status.ready);

        store
            .upsert("docs", None, &[vector("a"), vector("b")])
            .await
            .unwrap();
        // Same id overwrites
        store.upsert("docs", None, &[vector("a")]).await.unwrap();

        let stats = store.describe_index_stats("docs").await.unwrap();
        assert_eq!(stats.total_vector_count, 2);
        assert_eq!(
            store.call_names(),
            vec![
                "create_index",
                "list_indexes",
                "describe_index",
                "upsert",
                "upsert",
                "describe_index_stats"
            ]
        );
    }

    #[tokio::test]
    async fn test_readiness_after_describes() {
        let store = MemoryStore::with_readiness(Readiness::AfterDescribes(2));
        store
            .create_index(&IndexSpec::new("docs", 2, Metric::Cosine), Duration::ZERO)
            .await
            .unwrap();

        assert!(!store.describe_index("docs").await.unwrap().status.ready);
        assert!(!store.describe_index("docs").await.unwrap().status.ready);
        assert!(store.describe_index("docs").await.unwrap().status.ready);
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dimension() {
        let store = MemoryStore::new();
        store.insert_index(IndexSpec::new("docs", 3, Metric::Cosine), Vec::new());

        let err = store.upsert("docs", None, &[vector("a")]).await.unwrap_err();
        assert!(err.to_string().contains("expects 3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_waits_out_the_lag() {
        let store = MemoryStore::new().with_delete_lag(2);
        store.insert_index(IndexSpec::new("docs", 2, Metric::Cosine), vec![vector("a")]);
        let start = tokio::time::Instant::now();

        store.delete_index("docs").await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(2 * DELETE_POLL_INTERVAL_SECS));
        assert_eq!(
            store.call_names(),
            vec!["delete_index", "list_indexes", "list_indexes", "list_indexes"]
        );
        assert!(!store.index_exists("docs").await.unwrap());
        store
            .create_index(&IndexSpec::new("docs", 2, Metric::Cosine), Duration::ZERO)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_index_errors() {
        let store = MemoryStore::new();
        assert!(store.delete_index("docs").await.is_err());
        assert!(store.describe_index("docs").await.is_err());
        assert!(store.upsert("docs", None, &[vector("a")]).await.is_err());
    }
}
