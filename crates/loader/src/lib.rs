//! Index lifecycle and batch upsert orchestration.
//!
//! A sync run first makes sure the target index is in the desired state
//! (`lifecycle`), then turns incoming records into vectors (`record`),
//! buffers them (`batch`) and flushes each full batch as one upsert (`sink`).

pub mod batch;
pub mod lifecycle;
pub mod record;
pub mod sink;

// Re-export commonly used types
pub use batch::{Batch, MAX_BATCH_SIZE};
pub use lifecycle::{IndexAction, IndexLifecycleManager, ReadinessPolicy};
pub use record::{Record, RecordMapping};
pub use sink::{BatchUpsertSink, RecordSink, SinkSettings};
