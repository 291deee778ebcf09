//! Bounded buffer of vectors awaiting upsert.

use pinesink_vector::VectorRecord;

/// Max records written in one upsert call.
pub const MAX_BATCH_SIZE: usize = 100;

/// Ordered, bounded collection of vectors accumulated between flushes.
///
/// Never persisted: anything still buffered when the process dies is lost.
#[derive(Debug, Clone)]
pub struct Batch {
    records: Vec<VectorRecord>,
    max_size: usize,
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

impl Batch {
    /// Empty batch holding up to `MAX_BATCH_SIZE` records.
    pub fn new() -> Self {
        Self::with_max_size(MAX_BATCH_SIZE)
    }

    /// Empty batch with a custom bound (at least 1).
    pub fn with_max_size(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            records: Vec::with_capacity(max_size),
            max_size,
        }
    }

    pub fn push(&mut self, record: VectorRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether the batch reached its bound and must be flushed.
    pub fn is_full(&self) -> bool {
        self.records.len() >= self.max_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn records(&self) -> &[VectorRecord] {
        &self.records
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
