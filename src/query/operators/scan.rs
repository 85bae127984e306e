//! Scan Operator - in-memory row source
//!
//! Serves rows held in memory as batches of a configurable size. It stands
//! in for a table reader: rows are returned exactly in the order given, so
//! callers feeding SAMPLE BY must supply them in designated timestamp order.
//!
//! Each produced batch is charged to the execution context memory budget;
//! the consumer releases it once the batch has been processed.

use std::sync::Arc;
use tracing::trace;

use crate::query::error::QueryError;
use crate::query::executor::ExecutionContext;
use crate::query::operators::{Operator, RecordBatch};
use crate::types::{RecordMetadata, Value};

/// Scan operator over rows held in memory
#[derive(Debug)]
pub struct ScanOperator {
    /// All rows to serve
    data: RecordBatch,

    /// Batch size for output
    batch_size: usize,

    /// Current position in data stream
    position: usize,
}

impl ScanOperator {
    /// Create a new scan operator over `data`
    pub fn new(data: RecordBatch) -> Self {
        Self {
            data,
            batch_size: 4096,
            position: 0,
        }
    }

    /// Create a scan over row-major values
    pub fn from_rows(
        metadata: Arc<RecordMetadata>,
        rows: impl IntoIterator<Item = Vec<Value>>,
    ) -> Result<Self, QueryError> {
        Ok(Self::new(RecordBatch::from_rows(metadata, rows)?))
    }

    /// Set batch size
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Rows not yet served
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }
}

impl Operator for ScanOperator {
    fn next_batch(
        &mut self,
        ctx: &mut ExecutionContext,
    ) -> Result<Option<RecordBatch>, QueryError> {
        // Check for cancellation/timeout
        if ctx.should_stop() {
            if ctx.is_timed_out() {
                return Err(QueryError::timeout("Scan operator timed out"));
            }
            return Ok(None);
        }

        if self.position >= self.data.len() {
            return Ok(None);
        }

        let end = (self.position + self.batch_size).min(self.data.len());
        let batch = self.data.slice(self.position, end);
        self.position = end;

        // Track memory usage
        let mem_size = batch.memory_size();
        if !ctx.allocate_memory(mem_size) {
            return Err(QueryError::resource_limit(
                "Memory limit exceeded during scan",
            ));
        }

        trace!(rows = batch.len(), position = self.position, "Scan batch");
        Ok(Some(batch))
    }

    fn reset(&mut self) {
        self.position = 0;
    }

    fn name(&self) -> &'static str {
        "Scan"
    }

    fn metadata(&self) -> Arc<RecordMetadata> {
        Arc::clone(self.data.metadata())
    }

    fn estimated_cardinality(&self) -> usize {
        self.data.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
