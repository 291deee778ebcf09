//! Pinecone REST provider.
//!
//! Control plane: `{controller}/databases[/{name}]`.
//! Data plane: `https://{host}/describe_index_stats`, `https://{host}/vectors/upsert`,
//! where `host` comes from the index's describe status.

use crate::gateway::{VectorStoreGateway, DELETE_MAX_WAIT_SECS, DELETE_POLL_INTERVAL_SECS};
use crate::types::{IndexDescriptor, IndexSpec, IndexStats, VectorRecord};
use pinesink_core::{AppError, AppResult};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Default timeout for every request that does not set its own
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Upsert request body.
#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

/// Upsert response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

/// Pinecone client speaking the REST API.
pub struct PineconeClient {
    /// Control-plane base URL
    controller_url: String,

    api_key: String,

    client: Client,

    /// Data-plane base URL per index, filled from describe
    hosts: RwLock<HashMap<String, String>>,

    delete_poll_interval: Duration,
    delete_max_wait: Duration,
}

impl PineconeClient {
    /// Create a client for the given control-plane URL.
    pub fn new(controller_url: impl Into<String>, api_key: impl Into<String>) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                AppError::VectorStore(format!("Failed to create HTTP client for Pinecone: {}", e))
            })?;

        Ok(Self {
            controller_url: controller_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
            hosts: RwLock::new(HashMap::new()),
            delete_poll_interval: Duration::from_secs(DELETE_POLL_INTERVAL_SECS),
            delete_max_wait: Duration::from_secs(DELETE_MAX_WAIT_SECS),
        })
    }

    /// Override how long `delete_index` polls for the index to disappear.
    pub fn with_delete_polling(mut self, poll_interval: Duration, max_wait: Duration) -> Self {
        self.delete_poll_interval = poll_interval;
        self.delete_max_wait = max_wait;
        self
    }

    fn databases_url(&self) -> String {
        format!("{}/databases", self.controller_url)
    }

    fn database_url(&self, name: &str) -> String {
        format!("{}/databases/{}", self.controller_url, name)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Api-Key", &self.api_key)
            .header("Accept", "application/json")
    }

    /// Send a request and turn transport failures and non-2xx statuses into errors.
    async fn send(&self, request: RequestBuilder, action: &str) -> AppResult<Response> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| AppError::VectorStore(format!("Failed to {}: {}", action, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::VectorStore(format!(
                "Pinecone API error while trying to {} ({}): {}",
                action, status, error_text
            )));
        }

        Ok(response)
    }

    /// Data-plane base URL of an index, resolved through describe once.
    async fn data_plane_url(&self, name: &str) -> AppResult<String> {
        if let Some(url) = self.hosts.read().await.get(name) {
            return Ok(url.clone());
        }

        let descriptor = self.describe_index(name).await?;
        let host = descriptor.status.host.ok_or_else(|| {
            AppError::VectorStore(format!("Index `{}` has no data-plane host yet", name))
        })?;

        let url = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", host)
        };

        debug!("Resolved data-plane host for index `{}`: {}", name, url);
        self.hosts
            .write()
            .await
            .insert(name.to_string(), url.clone());
        Ok(url)
    }
}

#[async_trait::async_trait]
impl VectorStoreGateway for PineconeClient {
    fn provider_name(&self) -> &str {
        "pinecone"
    }

    #[instrument(skip(self))]
    async fn list_indexes(&self) -> AppResult<BTreeSet<String>> {
        let response = self
            .send(self.client.get(self.databases_url()), "list indexes")
            .await?;

        let names: Vec<String> = response.json().await.map_err(|e| {
            AppError::VectorStore(format!("Failed to parse index list: {}", e))
        })?;

        Ok(names.into_iter().collect())
    }

    #[instrument(skip(self, spec), fields(index = %spec.name))]
    async fn create_index(&self, spec: &IndexSpec, timeout: Duration) -> AppResult<()> {
        debug!("Create index request: {:?}", spec);

        let request = self
            .client
            .post(self.databases_url())
            .json(spec)
            .timeout(timeout);
        self.send(request, "create index").await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_index(&self, name: &str) -> AppResult<()> {
        self.send(self.client.delete(self.database_url(name)), "delete index")
            .await?;
        self.hosts.write().await.remove(name);

        // The control plane terminates the index in the background
        self.wait_until_deleted(name, self.delete_poll_interval, self.delete_max_wait)
            .await
    }

    #[instrument(skip(self))]
    async fn describe_index(&self, name: &str) -> AppResult<IndexDescriptor> {
        let response = self
            .send(self.client.get(self.database_url(name)), "describe index")
            .await?;

        response.json().await.map_err(|e| {
            AppError::VectorStore(format!("Failed to parse index description: {}", e))
        })
    }

    #[instrument(skip(self))]
    async fn describe_index_stats(&self, name: &str) -> AppResult<IndexStats> {
        let url = format!("{}/describe_index_stats", self.data_plane_url(name).await?);
        let request = self.client.post(url).json(&serde_json::json!({}));
        let response = self.send(request, "describe index stats").await?;

        response.json().await.map_err(|e| {
            AppError::VectorStore(format!("Failed to parse index stats: {}", e))
        })
    }

    #[instrument(skip(self, vectors), fields(count = vectors.len()))]
    async fn upsert(
        &self,
        name: &str,
        namespace: Option<&str>,
        vectors: &[VectorRecord],
    ) -> AppResult<usize> {
        let url = format!("{}/vectors/upsert", self.data_plane_url(name).await?);
        let body = UpsertRequest { vectors, namespace };
        let response = self
            .send(self.client.post(url).json(&body), "upsert vectors")
            .await?;

        let parsed: UpsertResponse = response.json().await.map_err(|e| {
            AppError::VectorStore(format!("Failed to parse upsert response: {}", e))
        })?;

        Ok(parsed.upserted_count)
    }
}
