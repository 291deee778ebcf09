//! Singer message driver.
//!
//! Reads newline-delimited SCHEMA / RECORD / STATE messages, routes records
//! to one sink per stream, flushes full batches and emits the latest STATE
//! once nothing is buffered.

use pinesink_core::{AppError, AppResult};
use pinesink_loader::{BatchUpsertSink, Record, RecordSink, SinkSettings};
use pinesink_vector::VectorStoreGateway;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// One input message.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
enum Message {
    Schema {
        stream: String,
        #[serde(default)]
        key_properties: Vec<String>,
    },
    Record {
        stream: String,
        record: Record,
    },
    State {
        value: Value,
    },
    #[serde(other)]
    Unknown,
}

/// Counters reported when a run completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub records: u64,
    pub batches: u64,
    pub states: u64,
}

pub struct Driver<W> {
    settings: SinkSettings,
    gateway: Arc<dyn VectorStoreGateway>,
    sinks: BTreeMap<String, BatchUpsertSink>,
    pending_state: Option<Value>,
    out: W,
    summary: RunSummary,
}

impl<W> Driver<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(settings: SinkSettings, gateway: Arc<dyn VectorStoreGateway>, out: W) -> Self {
        Self {
            settings,
            gateway,
            sinks: BTreeMap::new(),
            pending_state: None,
            out,
            summary: RunSummary::default(),
        }
    }

    /// Consume `input` to the end, then flush everything.
    pub async fn run<R>(&mut self, input: R) -> AppResult<RunSummary>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut line_no = 0usize;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let message: Message = serde_json::from_str(line).map_err(|e| {
                AppError::Protocol(format!("Invalid message on line {}: {}", line_no, e))
            })?;
            self.handle(message).await?;
        }

        self.flush_all().await?;
        self.emit_state_if_drained().await?;

        Ok(self.summary)
    }

    async fn handle(&mut self, message: Message) -> AppResult<()> {
        match message {
            Message::Schema {
                stream,
                key_properties,
            } => self.open_stream(stream, key_properties).await,
            Message::Record { stream, record } => self.write_record(&stream, &record).await,
            Message::State { value } => {
                self.pending_state = Some(value);
                self.emit_state_if_drained().await
            }
            Message::Unknown => {
                tracing::debug!("Ignoring message of unknown type");
                Ok(())
            }
        }
    }

    async fn open_stream(&mut self, stream: String, key_properties: Vec<String>) -> AppResult<()> {
        if self.sinks.contains_key(&stream) {
            tracing::debug!("Repeated SCHEMA for stream '{}', keeping sink", stream);
            return Ok(());
        }

        tracing::info!(
            "Opening stream '{}' (key properties: {:?})",
            stream,
            key_properties
        );
        let mut sink = BatchUpsertSink::new(
            stream.clone(),
            self.settings.clone(),
            key_properties,
            self.gateway.clone(),
        );
        sink.initialize().await?;
        self.sinks.insert(stream, sink);
        Ok(())
    }

    async fn write_record(&mut self, stream: &str, record: &Record) -> AppResult<()> {
        let sink = self.sinks.get_mut(stream).ok_or_else(|| {
            AppError::Protocol(format!(
                "RECORD for stream '{}' arrived before its SCHEMA",
                stream
            ))
        })?;

        sink.process_record(record)?;
        self.summary.records += 1;

        if sink.is_full() {
            sink.flush().await?;
            self.summary.batches += 1;
            self.emit_state_if_drained().await?;
        }
        Ok(())
    }

    async fn flush_all(&mut self) -> AppResult<()> {
        for sink in self.sinks.values_mut() {
            if sink.pending() == 0 {
                continue;
            }
            tracing::debug!(
                "Draining {} records of stream '{}'",
                sink.pending(),
                sink.stream()
            );
            sink.flush().await?;
            self.summary.batches += 1;
        }
        Ok(())
    }

    /// Write the latest STATE to the output once no sink holds records.
    async fn emit_state_if_drained(&mut self) -> AppResult<()> {
        if self.sinks.values().any(|sink| sink.pending() > 0) {
            return Ok(());
        }
        let Some(state) = self.pending_state.take() else {
            return Ok(());
        };

        let line = serde_json::to_string(&state)?;
        self.out.write_all(line.as_bytes()).await?;
        self.out.write_all(b"\n").await?;
        self.out.flush().await?;

        self.summary.states += 1;
        tracing::debug!("Emitted state: {}", line);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinesink_core::{LoadMethod, SinkConfig};
    use pinesink_loader::record::content_id;
    use pinesink_vector::{GatewayCall, MemoryStore};

    fn settings() -> SinkSettings {
        SinkSettings::from(&SinkConfig {
            index_name: "docs".to_string(),
            dimensions: 2,
            load_method: LoadMethod::Append,
            provider: "memory".to_string(),
            ..Default::default()
        })
    }

    fn record_line(stream: &str, text: &str) -> String {
        serde_json::json!({
            "type": "RECORD",
            "stream": stream,
            "record": {"text": text, "embeddings": [1.0, 2.0], "metadata": {"n": text}}
        })
        .to_string()
    }

    async fn run(store: &Arc<MemoryStore>, input: &str) -> (AppResult<RunSummary>, String) {
        let mut out = Vec::new();
        let result = {
            let mut driver = Driver::new(settings(), store.clone(), &mut out);
            driver.run(input.as_bytes()).await
        };
        (result, String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn test_schema_records_state() {
        let store = Arc::new(MemoryStore::new());
        let input = [
            r#"{"type": "SCHEMA", "stream": "docs", "schema": {}, "key_properties": []}"#.to_string(),
            record_line("docs", "foo"),
            record_line("docs", "bar"),
            r#"{"type": "STATE", "value": {"bookmarks": {"docs": 2}}}"#.to_string(),
        ]
        .join("\n");

        let (result, out) = run(&store, &input).await;
        let summary = result.unwrap();

        assert_eq!(
            summary,
            RunSummary {
                records: 2,
                batches: 1,
                states: 1
            }
        );
        assert_eq!(out, "{\"bookmarks\":{\"docs\":2}}\n");
        assert_eq!(
            store.call_names(),
            vec!["list_indexes", "create_index", "describe_index", "upsert"]
        );

        let ids: Vec<String> = store.vectors("docs").into_iter().map(|v| v.id).collect();
        let mut expected = vec![content_id("foo"), content_id("bar")];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_full_batches_flush_during_the_run() {
        let store = Arc::new(MemoryStore::new());
        let mut lines = vec![r#"{"type": "SCHEMA", "stream": "docs", "schema": {}}"#.to_string()];
        for i in 0..250 {
            lines.push(record_line("docs", &format!("doc {}", i)));
        }

        let (result, _) = run(&store, &lines.join("\n")).await;
        assert_eq!(result.unwrap().batches, 3);

        let sizes: Vec<usize> = store
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::Upsert { vectors, .. } => Some(vectors.len()),
                _ => None,
            })
            .collect();
        assert_eq!(sizes, vec![100, 100, 50]);
    }

    #[tokio::test]
    async fn test_state_waits_for_buffered_records() {
        let store = Arc::new(MemoryStore::new());
        let input = [
            r#"{"type": "SCHEMA", "stream": "docs", "schema": {}}"#.to_string(),
            record_line("docs", "foo"),
            r#"{"type": "STATE", "value": {"v": 1}}"#.to_string(),
            r#"{"type": "STATE", "value": {"v": 2}}"#.to_string(),
        ]
        .join("\n");

        let (result, out) = run(&store, &input).await;
        assert_eq!(result.unwrap().states, 1);
        // Only the latest state survives until the final flush
        assert_eq!(out, "{\"v\":2}\n");
    }

    #[tokio::test]
    async fn test_state_emitted_immediately_when_nothing_buffered() {
        let store = Arc::new(MemoryStore::new());
        let input = r#"{"type": "STATE", "value": {"v": 1}}"#;

        let (result, out) = run(&store, input).await;
        assert_eq!(result.unwrap().states, 1);
        assert_eq!(out, "{\"v\":1}\n");
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_record_before_schema_is_protocol_error() {
        let store = Arc::new(MemoryStore::new());
        let (result, _) = run(&store, &record_line("docs", "foo")).await;
        assert!(matches!(result, Err(AppError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_malformed_line_is_protocol_error() {
        let store = Arc::new(MemoryStore::new());
        let (result, _) = run(&store, "not json").await;
        match result {
            Err(AppError::Protocol(msg)) => assert!(msg.contains("line 1")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_messages_and_blank_lines_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let input = "\n{\"type\": \"ACTIVATE_VERSION\", \"stream\": \"docs\", \"version\": 1}\n\n";
        let (result, out) = run(&store, input).await;
        assert_eq!(result.unwrap(), RunSummary::default());
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_each_stream_gets_its_own_sink_and_keys() {
        let store = Arc::new(MemoryStore::new());
        let keyed = serde_json::json!({
            "type": "RECORD",
            "stream": "chunks",
            "record": {"text": "foo", "embeddings": [1.0, 2.0], "doc": "a", "chunk": 7}
        });
        let input = [
            r#"{"type": "SCHEMA", "stream": "docs", "schema": {}}"#.to_string(),
            r#"{"type": "SCHEMA", "stream": "chunks", "schema": {}, "key_properties": ["doc", "chunk"]}"#.to_string(),
            record_line("docs", "foo"),
            keyed.to_string(),
        ]
        .join("\n");

        let (result, _) = run(&store, &input).await;
        assert_eq!(result.unwrap().batches, 2);

        let ids: Vec<String> = store.vectors("docs").into_iter().map(|v| v.id).collect();
        assert!(ids.contains(&"a:7".to_string()));
        assert!(ids.contains(&content_id("foo")));

        // Index already exists when the second sink initializes
        let creates = store
            .call_names()
            .into_iter()
            .filter(|name| *name == "create_index")
            .count();
        assert_eq!(creates, 1);
    }
}
