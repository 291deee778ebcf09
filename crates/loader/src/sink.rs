//! Batch upsert sink.
//!
//! The stream driver talks to sinks through `RecordSink`: initialize once,
//! hand over records one at a time, and flush whenever a batch is full or
//! the stream ends.

use crate::batch::Batch;
use crate::lifecycle::{IndexAction, IndexLifecycleManager};
use crate::record::{Record, RecordMapping};
use pinesink_core::{AppResult, LoadMethod, SinkConfig};
use pinesink_vector::VectorStoreGateway;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace};

/// Capability the stream driver needs from a sink.
#[async_trait::async_trait]
pub trait RecordSink: Send {
    /// Prepare the destination. Runs before any record is accepted.
    async fn initialize(&mut self) -> AppResult<()>;

    /// Transform and buffer one record. Performs no I/O.
    fn process_record(&mut self, record: &Record) -> AppResult<()>;

    /// Whether the buffer reached its bound.
    fn is_full(&self) -> bool;

    /// Number of buffered records.
    fn pending(&self) -> usize;

    /// Write out everything buffered and return once fully written.
    ///
    /// Returns the number of records flushed.
    async fn flush(&mut self) -> AppResult<usize>;
}

/// Settings a sink needs, taken from `SinkConfig`.
#[derive(Debug, Clone)]
pub struct SinkSettings {
    pub index_name: String,
    pub load_method: LoadMethod,
    /// Dimension used only when the index is created
    pub dimensions: u32,
    pub namespace: Option<String>,
    pub mapping: RecordMapping,
}

impl From<&SinkConfig> for SinkSettings {
    fn from(config: &SinkConfig) -> Self {
        Self {
            index_name: config.index_name.clone(),
            load_method: config.load_method,
            dimensions: config.dimensions,
            namespace: config.namespace.clone(),
            mapping: RecordMapping::from(config),
        }
    }
}

/// Buffers records of one stream and upserts them in batches.
pub struct BatchUpsertSink {
    stream: String,
    settings: SinkSettings,
    key_properties: Vec<String>,
    gateway: Arc<dyn VectorStoreGateway>,
    batch: Batch,
    index_action: Option<IndexAction>,
    records_flushed: u64,
    batches_flushed: u64,
}

impl BatchUpsertSink {
    /// Create a sink for `stream`.
    ///
    /// `key_properties` come from the stream schema; when empty, ids are
    /// content hashes of the document text.
    pub fn new(
        stream: impl Into<String>,
        settings: SinkSettings,
        key_properties: Vec<String>,
        gateway: Arc<dyn VectorStoreGateway>,
    ) -> Self {
        Self {
            stream: stream.into(),
            settings,
            key_properties,
            gateway,
            batch: Batch::new(),
            index_action: None,
            records_flushed: 0,
            batches_flushed: 0,
        }
    }

    /// Replace the batch bound.
    pub fn with_max_batch_size(mut self, max_size: usize) -> Self {
        self.batch = Batch::with_max_size(max_size);
        self
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Outcome of the lifecycle run, once initialized.
    pub fn index_action(&self) -> Option<IndexAction> {
        self.index_action
    }

    pub fn records_flushed(&self) -> u64 {
        self.records_flushed
    }

    pub fn batches_flushed(&self) -> u64 {
        self.batches_flushed
    }
}

#[async_trait::async_trait]
impl RecordSink for BatchUpsertSink {
    async fn initialize(&mut self) -> AppResult<()> {
        if self.index_action.is_some() {
            return Ok(());
        }

        let manager = IndexLifecycleManager::new(self.gateway.clone());
        let action = manager
            .ensure_index_ready(
                &self.settings.index_name,
                self.settings.load_method,
                self.settings.dimensions,
            )
            .await?;

        debug!(
            "Sink for stream '{}' initialized: index `{}` {}",
            self.stream, self.settings.index_name, action
        );
        self.index_action = Some(action);
        Ok(())
    }

    fn process_record(&mut self, record: &Record) -> AppResult<()> {
        let vector = self
            .settings
            .mapping
            .to_vector(record, &self.key_properties)?;

        trace!("Buffered vector '{}' for stream '{}'", vector.id, self.stream);
        self.batch.push(vector);
        Ok(())
    }

    fn is_full(&self) -> bool {
        self.batch.is_full()
    }

    fn pending(&self) -> usize {
        self.batch.len()
    }

    async fn flush(&mut self) -> AppResult<usize> {
        if self.batch.is_empty() {
            return Ok(0);
        }

        let start = Instant::now();
        let count = self.batch.len();

        self.gateway
            .upsert(
                &self.settings.index_name,
                self.settings.namespace.as_deref(),
                self.batch.records(),
            )
            .await?;

        self.batch.clear();
        self.records_flushed += count as u64;
        self.batches_flushed += 1;

        info!(
            "Upserted {} records from stream '{}' into `{}` in {:.2}s",
            count,
            self.stream,
            self.settings.index_name,
            start.elapsed().as_secs_f64()
        );
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::content_id;
    use pinesink_core::AppError;
    use pinesink_vector::{GatewayCall, IndexSpec, Metadata, MemoryStore, Metric, VectorRecord};
    use serde_json::{json, Value};

    fn settings(load_method: LoadMethod) -> SinkSettings {
        let config = SinkConfig {
            index_name: "target-pinecone-index".to_string(),
            document_text_property: "doc_text".to_string(),
            embeddings_property: "embeddings_data".to_string(),
            metadata_property: "embedding_metadata".to_string(),
            load_method,
            dimensions: 2,
            provider: "memory".to_string(),
            ..Default::default()
        };
        SinkSettings::from(&config)
    }

    fn sink(store: &Arc<MemoryStore>, load_method: LoadMethod) -> BatchUpsertSink {
        BatchUpsertSink::new("docs", settings(load_method), Vec::new(), store.clone())
    }

    fn foo_record() -> Record {
        match json!({"doc_text": "foo", "embeddings_data": [1.0, 2.0], "embedding_metadata": {"key": "val"}}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn text_record(text: &str) -> Record {
        match json!({"doc_text": text, "embeddings_data": [0.5, 0.5]}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn expected_foo_vector() -> VectorRecord {
        let mut metadata = Metadata::new();
        metadata.insert("key".to_string(), json!("val"));
        metadata.insert("text".to_string(), json!("foo"));
        VectorRecord::new(content_id("foo"), vec![1.0, 2.0], metadata)
    }

    fn upserts(store: &MemoryStore) -> Vec<Vec<VectorRecord>> {
        store
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::Upsert { vectors, .. } => Some(vectors),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_end_to_end_single_record() {
        let store = Arc::new(MemoryStore::new());
        let mut sink = sink(&store, LoadMethod::Append);

        sink.initialize().await.unwrap();
        sink.process_record(&foo_record()).unwrap();
        assert_eq!(sink.flush().await.unwrap(), 1);

        assert_eq!(sink.index_action(), Some(IndexAction::Created));
        assert_eq!(
            store.calls().last(),
            Some(&GatewayCall::Upsert {
                index: "target-pinecone-index".to_string(),
                namespace: None,
                vectors: vec![expected_foo_vector()],
            })
        );
    }

    #[tokio::test]
    async fn test_process_record_does_no_io() {
        let store = Arc::new(MemoryStore::new());
        let mut sink = sink(&store, LoadMethod::Append);
        sink.initialize().await.unwrap();
        store.clear_calls();

        for i in 0..10 {
            sink.process_record(&text_record(&i.to_string())).unwrap();
        }

        assert!(store.calls().is_empty());
        assert_eq!(sink.pending(), 10);
    }

    #[tokio::test]
    async fn test_flush_is_one_upsert_with_everything_buffered() {
        let store = Arc::new(MemoryStore::new());
        let mut sink = sink(&store, LoadMethod::Append);
        sink.initialize().await.unwrap();

        for i in 0..100 {
            sink.process_record(&text_record(&format!("doc {}", i))).unwrap();
        }
        assert!(sink.is_full());
        assert_eq!(sink.flush().await.unwrap(), 100);

        sink.process_record(&text_record("tail")).unwrap();
        assert_eq!(sink.flush().await.unwrap(), 1);

        let batches = upserts(&store);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 100);
        assert_eq!(batches[0][0].id, content_id("doc 0"));
        assert_eq!(batches[1][0].id, content_id("tail"));
        assert_eq!(sink.records_flushed(), 101);
        assert_eq!(sink.batches_flushed(), 2);
        assert_eq!(sink.pending(), 0);
    }

    #[tokio::test]
    async fn test_custom_batch_bound() {
        let store = Arc::new(MemoryStore::new());
        let mut sink = sink(&store, LoadMethod::Append).with_max_batch_size(2);
        assert_eq!(sink.stream(), "docs");
        sink.initialize().await.unwrap();

        sink.process_record(&text_record("a")).unwrap();
        assert!(!sink.is_full());
        sink.process_record(&text_record("b")).unwrap();
        assert!(sink.is_full());
        assert_eq!(sink.flush().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_empty_flush_makes_no_call() {
        let store = Arc::new(MemoryStore::new());
        let mut sink = sink(&store, LoadMethod::Append);
        sink.initialize().await.unwrap();
        store.clear_calls();

        assert_eq!(sink.flush().await.unwrap(), 0);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_recreates_before_upsert() {
        let store = Arc::new(MemoryStore::new());
        let spec = IndexSpec {
            replicas: Some(3),
            pod_type: Some("s1.x1".to_string()),
            ..IndexSpec::new("target-pinecone-index", 2, Metric::Euclidean)
        };
        store.insert_index(
            spec.clone(),
            vec![VectorRecord::new("old", vec![0.0, 0.0], Metadata::new())],
        );

        let mut sink = sink(&store, LoadMethod::Overwrite);
        sink.initialize().await.unwrap();
        sink.process_record(&foo_record()).unwrap();
        sink.flush().await.unwrap();

        let names = store.call_names();
        let delete = names.iter().position(|n| *n == "delete_index").unwrap();
        let create = names.iter().position(|n| *n == "create_index").unwrap();
        let upsert = names.iter().position(|n| *n == "upsert").unwrap();
        assert!(delete < create && create < upsert);

        assert_eq!(store.spec("target-pinecone-index"), Some(spec));
        assert_eq!(store.vectors("target-pinecone-index"), vec![expected_foo_vector()]);
    }

    #[tokio::test]
    async fn test_append_existing_index_has_no_create_or_delete() {
        let store = Arc::new(MemoryStore::new());
        store.insert_index(
            IndexSpec::new("target-pinecone-index", 2, Metric::Cosine),
            Vec::new(),
        );

        let mut sink = sink(&store, LoadMethod::Append);
        sink.initialize().await.unwrap();
        sink.process_record(&foo_record()).unwrap();
        sink.flush().await.unwrap();

        assert_eq!(store.call_names(), vec!["list_indexes", "upsert"]);
        assert_eq!(upserts(&store), vec![vec![expected_foo_vector()]]);
    }

    #[tokio::test]
    async fn test_initialize_runs_lifecycle_once() {
        let store = Arc::new(MemoryStore::new());
        let mut sink = sink(&store, LoadMethod::Append);

        sink.initialize().await.unwrap();
        sink.initialize().await.unwrap();

        let creates = store
            .call_names()
            .into_iter()
            .filter(|n| *n == "create_index")
            .count();
        assert_eq!(creates, 1);
    }

    #[tokio::test]
    async fn test_failed_upsert_keeps_batch_and_propagates() {
        let store = Arc::new(MemoryStore::new());
        let mut sink = sink(&store, LoadMethod::Append);
        sink.initialize().await.unwrap();

        // Wrong dimension: the store rejects the whole batch
        let bad = match json!({"doc_text": "foo", "embeddings_data": [1.0, 2.0, 3.0]}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        sink.process_record(&foo_record()).unwrap();
        sink.process_record(&bad).unwrap();

        let err = sink.flush().await.unwrap_err();
        assert!(matches!(err, AppError::VectorStore(_)));
        assert_eq!(sink.pending(), 2);
        assert_eq!(sink.records_flushed(), 0);
        assert!(store.vectors("target-pinecone-index").is_empty());
    }

    #[tokio::test]
    async fn test_key_properties_drive_ids() {
        let store = Arc::new(MemoryStore::new());
        let mut sink = BatchUpsertSink::new(
            "docs",
            settings(LoadMethod::Append),
            vec!["source".to_string(), "chunk".to_string()],
            store.clone(),
        );
        sink.initialize().await.unwrap();

        let mut record = foo_record();
        record.insert("source".to_string(), json!("readme"));
        record.insert("chunk".to_string(), json!(3));
        sink.process_record(&record).unwrap();
        sink.flush().await.unwrap();

        assert_eq!(store.vectors("target-pinecone-index")[0].id, "readme:3");
    }
}
