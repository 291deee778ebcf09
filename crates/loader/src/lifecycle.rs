//! Index lifecycle management.
//!
//! Runs once per sink, before any upsert, and decides whether the target
//! index must be created, recreated with its previous configuration, or
//! reused as-is.

use pinesink_core::{AppError, AppResult, LoadMethod};
use pinesink_vector::{IndexDescriptor, IndexSpec, Metric, VectorStoreGateway};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Interval between readiness polls.
pub const POLL_INTERVAL_SECS: u64 = 10;

/// Longest wait for a new index to become ready (5 minutes).
pub const MAX_WAIT_SECS: u64 = 300;

/// Request timeout passed along with create; creation should never take this long.
pub const CREATE_TIMEOUT_SECS: u64 = 600;

/// Metric of indexes created from scratch.
pub const DEFAULT_METRIC: Metric = Metric::Cosine;

/// Poll/timeout policy used while waiting for an index to become ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(POLL_INTERVAL_SECS),
            max_wait: Duration::from_secs(MAX_WAIT_SECS),
        }
    }
}

/// What `ensure_index_ready` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexAction {
    /// Index did not exist and was created
    Created,
    /// Non-empty index was deleted and recreated with its old configuration
    Recreated,
    /// Overwrite requested but the index was empty, so it was kept
    SkippedEmptyRecreate,
    /// Existing index kept as-is (append)
    Reused,
}

impl fmt::Display for IndexAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Recreated => "recreated",
            Self::SkippedEmptyRecreate => "skipped-empty-recreate",
            Self::Reused => "reused",
        };
        f.write_str(s)
    }
}

/// Creates, recreates or reuses the target index.
pub struct IndexLifecycleManager {
    gateway: Arc<dyn VectorStoreGateway>,
    policy: ReadinessPolicy,
}

impl IndexLifecycleManager {
    pub fn new(gateway: Arc<dyn VectorStoreGateway>) -> Self {
        Self::with_policy(gateway, ReadinessPolicy::default())
    }

    pub fn with_policy(gateway: Arc<dyn VectorStoreGateway>, policy: ReadinessPolicy) -> Self {
        Self { gateway, policy }
    }

    /// Make sure `index_name` exists in the state `load_method` asks for.
    ///
    /// `dimensions` is only used when the index has to be created from scratch.
    #[instrument(skip(self), fields(provider = self.gateway.provider_name()))]
    pub async fn ensure_index_ready(
        &self,
        index_name: &str,
        load_method: LoadMethod,
        dimensions: u32,
    ) -> AppResult<IndexAction> {
        if !self.gateway.index_exists(index_name).await? {
            self.create_index(index_name, dimensions).await?;
            return Ok(IndexAction::Created);
        }

        info!("Index `{}` found", index_name);

        match load_method {
            LoadMethod::Append => Ok(IndexAction::Reused),
            LoadMethod::Overwrite => {
                let stats = self.gateway.describe_index_stats(index_name).await?;
                if stats.total_vector_count == 0 {
                    info!(
                        "The load_method is {} but the index is empty, not re-creating.",
                        load_method
                    );
                    return Ok(IndexAction::SkippedEmptyRecreate);
                }

                info!(
                    "Deleting index `{}` ({} vectors) because load_method is {}",
                    index_name, stats.total_vector_count, load_method
                );
                self.recreate_index(index_name).await?;
                Ok(IndexAction::Recreated)
            }
        }
    }

    /// Create a new index with the fixed metric and wait for it.
    async fn create_index(&self, index_name: &str, dimensions: u32) -> AppResult<()> {
        info!(
            "Creating index `{}` (dimension {}, metric {})",
            index_name, dimensions, DEFAULT_METRIC
        );

        let spec = IndexSpec::new(index_name, dimensions, DEFAULT_METRIC);
        self.gateway
            .create_index(&spec, Duration::from_secs(CREATE_TIMEOUT_SECS))
            .await?;

        self.wait_until_ready(index_name).await?;
        Ok(())
    }

    /// Capture the current configuration, delete, and create again from it.
    async fn recreate_index(&self, index_name: &str) -> AppResult<()> {
        let IndexDescriptor { spec, .. } = self.gateway.describe_index(index_name).await?;
        debug!("Captured configuration of `{}`: {:?}", index_name, spec);

        self.gateway.delete_index(index_name).await?;

        info!(
            "Re-creating index `{}` (dimension {}, metric {})",
            index_name, spec.dimension, spec.metric
        );
        self.gateway
            .create_index(&spec, Duration::from_secs(CREATE_TIMEOUT_SECS))
            .await?;

        self.wait_until_ready(index_name).await?;
        Ok(())
    }

    /// Poll describe until the index reports ready or the max wait passes.
    async fn wait_until_ready(&self, index_name: &str) -> AppResult<IndexDescriptor> {
        info!("Index `{}` created.", index_name);

        let max_wait_secs = self.policy.max_wait.as_secs();
        let mut descriptor = self.gateway.describe_index(index_name).await?;
        let mut waited = Duration::ZERO;

        while !descriptor.status.ready {
            info!(
                "Waiting for index to be ready...{}s /{}s Max",
                waited.as_secs(),
                max_wait_secs
            );
            tokio::time::sleep(self.policy.poll_interval).await;

            descriptor = self.gateway.describe_index(index_name).await?;
            waited += self.policy.poll_interval;

            if !descriptor.status.ready && waited >= self.policy.max_wait {
                return Err(AppError::IndexNotReady {
                    index: index_name.to_string(),
                    status: descriptor.status.to_string(),
                    elapsed_secs: waited.as_secs(),
                });
            }
        }

        info!("Index `{}` ready!", index_name);
        Ok(descriptor)
    }
}
