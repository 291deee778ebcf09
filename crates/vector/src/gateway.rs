//! Vector store capability interface.

use crate::types::{IndexDescriptor, IndexSpec, IndexStats, VectorRecord};
use pinesink_core::{AppError, AppResult};
use std::collections::BTreeSet;
use std::time::Duration;

/// Interval between `list_indexes` polls while a deleted index terminates.
pub const DELETE_POLL_INTERVAL_SECS: u64 = 5;

/// Longest wait for a deleted index to disappear from the listing.
pub const DELETE_MAX_WAIT_SECS: u64 = 300;

/// Trait for vector store backends.
///
/// Implementations surface every failure unchanged; nothing here retries.
/// `create_index` is asynchronous on the server side, so callers poll
/// `describe_index` until the status reports ready. `delete_index` only
/// returns once the index is no longer listed.
#[async_trait::async_trait]
pub trait VectorStoreGateway: Send + Sync {
    /// Get the provider name (e.g., "pinecone", "memory").
    fn provider_name(&self) -> &str;

    /// Names of all indexes in the project.
    async fn list_indexes(&self) -> AppResult<BTreeSet<String>>;

    /// Whether an index with this name exists.
    async fn index_exists(&self, name: &str) -> AppResult<bool> {
        Ok(self.list_indexes().await?.contains(name))
    }

    /// Request creation of an index; `timeout` bounds the request itself.
    async fn create_index(&self, spec: &IndexSpec, timeout: Duration) -> AppResult<()>;

    /// Delete an index and all of its vectors, then wait until it is gone.
    async fn delete_index(&self, name: &str) -> AppResult<()>;

    /// Poll `list_indexes` until `name` is no longer listed.
    ///
    /// # Errors
    /// Returns `AppError::VectorStore` if the index is still listed after
    /// `max_wait`.
    async fn wait_until_deleted(
        &self,
        name: &str,
        poll_interval: Duration,
        max_wait: Duration,
    ) -> AppResult<()> {
        let mut waited = Duration::ZERO;

        while self.index_exists(name).await? {
            if waited >= max_wait {
                return Err(AppError::VectorStore(format!(
                    "Index `{}` still listed {}s after delete",
                    name,
                    waited.as_secs()
                )));
            }
            tracing::info!(
                "Waiting for index `{}` to be deleted...{}s /{}s Max",
                name,
                waited.as_secs(),
                max_wait.as_secs()
            );
            tokio::time::sleep(poll_interval).await;
            waited += poll_interval;
        }

        Ok(())
    }

    /// Configuration and readiness status of an index.
    async fn describe_index(&self, name: &str) -> AppResult<IndexDescriptor>;

    /// Aggregate stats (dimension, vector counts) of an index.
    async fn describe_index_stats(&self, name: &str) -> AppResult<IndexStats>;

    /// Insert or overwrite vectors by id. Returns the number upserted.
    async fn upsert(
        &self,
        name: &str,
        namespace: Option<&str>,
        vectors: &[VectorRecord],
    ) -> AppResult<usize>;
}
