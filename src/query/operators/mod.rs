//! Query Operators - batch-at-a-time execution primitives
//!
//! This module provides the building blocks for SAMPLE BY execution:
//! - Scan operator serving rows from memory in fixed-size batches
//! - The SAMPLE BY operator that buckets, groups and interpolates
//!
//! Operators exchange columnar [`RecordBatch`]es. Every column is a typed
//! vector with in-band null sentinels (NaN for doubles, `i64::MIN` for longs
//! and timestamps, `None` for symbols), so no separate validity bitmap is
//! carried.

pub mod sample_by;
pub mod scan;

// Re-export commonly used types
pub use sample_by::{EngineState, SampleByOperator};
pub use scan::ScanOperator;

use std::sync::Arc;

use crate::query::error::QueryError;
use crate::query::executor::ExecutionContext;
use crate::types::{
    ColumnType, RecordMetadata, Timestamp, Value, LONG_NULL, TIMESTAMP_NULL,
};

// ============================================================================
// Record Batch
// ============================================================================

/// A single typed column of a batch
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Double values, NaN is null
    Double(Vec<f64>),
    /// Long values, `LONG_NULL` is null
    Long(Vec<i64>),
    /// Timestamps in microseconds, `TIMESTAMP_NULL` is null
    Timestamp(Vec<Timestamp>),
    /// Symbol values
    Symbol(Vec<Option<String>>),
}

impl Column {
    /// Empty column of the given type
    pub fn with_capacity(column_type: ColumnType, capacity: usize) -> Self {
        match column_type {
            ColumnType::Double => Column::Double(Vec::with_capacity(capacity)),
            ColumnType::Long => Column::Long(Vec::with_capacity(capacity)),
            ColumnType::Timestamp => Column::Timestamp(Vec::with_capacity(capacity)),
            ColumnType::Symbol => Column::Symbol(Vec::with_capacity(capacity)),
        }
    }

    /// Number of values
    pub fn len(&self) -> usize {
        match self {
            Column::Double(v) => v.len(),
            Column::Long(v) => v.len(),
            Column::Timestamp(v) => v.len(),
            Column::Symbol(v) => v.len(),
        }
    }

    /// Whether the column holds no values
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Column type
    pub fn column_type(&self) -> ColumnType {
        match self {
            Column::Double(_) => ColumnType::Double,
            Column::Long(_) => ColumnType::Long,
            Column::Timestamp(_) => ColumnType::Timestamp,
            Column::Symbol(_) => ColumnType::Symbol,
        }
    }

    /// Append a value, converting between compatible numeric types
    ///
    /// A value that cannot be represented in this column is stored as null.
    pub fn push(&mut self, value: Value) {
        match self {
            Column::Double(v) => v.push(value.as_f64().unwrap_or(f64::NAN)),
            Column::Long(v) => v.push(match value {
                Value::Long(x) | Value::Timestamp(x) => x,
                _ => LONG_NULL,
            }),
            Column::Timestamp(v) => v.push(match value {
                Value::Long(x) | Value::Timestamp(x) => x,
                _ => TIMESTAMP_NULL,
            }),
            Column::Symbol(v) => v.push(match value {
                Value::Symbol(s) => s,
                _ => None,
            }),
        }
    }

    /// Value at `row`
    pub fn value(&self, row: usize) -> Option<Value> {
        match self {
            Column::Double(v) => v.get(row).map(|x| Value::Double(*x)),
            Column::Long(v) => v.get(row).map(|x| Value::Long(*x)),
            Column::Timestamp(v) => v.get(row).map(|x| Value::Timestamp(*x)),
            Column::Symbol(v) => v.get(row).map(|x| Value::Symbol(x.clone())),
        }
    }

    /// Approximate heap size in bytes
    pub fn memory_size(&self) -> usize {
        match self {
            Column::Double(v) => v.len() * 8,
            Column::Long(v) | Column::Timestamp(v) => v.len() * 8,
            Column::Symbol(v) => v
                .iter()
                .map(|s| std::mem::size_of::<Option<String>>() + s.as_ref().map_or(0, |s| s.len()))
                .sum(),
        }
    }
}

/// A columnar batch of rows
///
/// Columns line up with the batch metadata and all have the same length.
#[derive(Debug, Clone)]
pub struct RecordBatch {
    metadata: Arc<RecordMetadata>,
    columns: Vec<Column>,
}

impl RecordBatch {
    /// Create a batch from columns matching `metadata`
    pub fn new(metadata: Arc<RecordMetadata>, columns: Vec<Column>) -> Result<Self, QueryError> {
        if columns.len() != metadata.column_count() {
            return Err(QueryError::internal(format!(
                "batch has {} columns, metadata declares {}",
                columns.len(),
                metadata.column_count()
            )));
        }

        let rows = columns.first().map_or(0, Column::len);
        for (i, column) in columns.iter().enumerate() {
            if Some(column.column_type()) != metadata.column_type(i) {
                return Err(QueryError::internal(format!(
                    "column {} is {}, metadata declares {:?}",
                    i,
                    column.column_type(),
                    metadata.column_type(i)
                )));
            }
            if column.len() != rows {
                return Err(QueryError::internal(format!(
                    "column {} has {} rows, expected {}",
                    i,
                    column.len(),
                    rows
                )));
            }
        }

        Ok(Self { metadata, columns })
    }

    /// Empty batch with room for `capacity` rows
    pub fn with_capacity(metadata: Arc<RecordMetadata>, capacity: usize) -> Self {
        let columns = metadata
            .columns()
            .iter()
            .map(|c| Column::with_capacity(c.column_type, capacity))
            .collect();
        Self { metadata, columns }
    }

    /// Build a batch from row-major values
    pub fn from_rows(
        metadata: Arc<RecordMetadata>,
        rows: impl IntoIterator<Item = Vec<Value>>,
    ) -> Result<Self, QueryError> {
        let mut batch = Self::with_capacity(metadata, 0);
        for row in rows {
            batch.push_row(row)?;
        }
        Ok(batch)
    }

    /// Append one row
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), QueryError> {
        if row.len() != self.columns.len() {
            return Err(QueryError::validation(format!(
                "row has {} values, expected {}",
                row.len(),
                self.columns.len()
            )));
        }
        for (column, value) in self.columns.iter_mut().zip(row) {
            column.push(value);
        }
        Ok(())
    }

    /// Batch metadata
    pub fn metadata(&self) -> &Arc<RecordMetadata> {
        &self.metadata
    }

    /// All columns
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column at `index`
    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Number of rows in the batch
    #[inline]
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    /// Check if batch is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Memory size in bytes
    pub fn memory_size(&self) -> usize {
        self.columns.iter().map(Column::memory_size).sum()
    }

    /// Borrow one row
    #[inline]
    pub fn row(&self, row: usize) -> RowRef<'_> {
        RowRef { batch: self, row }
    }

    /// Owned values of one row
    pub fn row_values(&self, row: usize) -> Vec<Value> {
        self.columns
            .iter()
            .filter_map(|c| c.value(row))
            .collect()
    }

    /// Copy rows `[start, end)` into a new batch
    pub fn slice(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.len());
        let start = start.min(end);
        let columns = self
            .columns
            .iter()
            .map(|c| match c {
                Column::Double(v) => Column::Double(v[start..end].to_vec()),
                Column::Long(v) => Column::Long(v[start..end].to_vec()),
                Column::Timestamp(v) => Column::Timestamp(v[start..end].to_vec()),
                Column::Symbol(v) => Column::Symbol(v[start..end].to_vec()),
            })
            .collect();
        Self {
            metadata: Arc::clone(&self.metadata),
            columns,
        }
    }
}

/// Typed accessors over one row of a batch
///
/// Out-of-range columns and cross-type reads yield the null of the requested
/// type, mirroring how a missing value reads from a columnar store.
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    batch: &'a RecordBatch,
    row: usize,
}

impl<'a> RowRef<'a> {
    /// Index of the row inside its batch
    pub fn index(&self) -> usize {
        self.row
    }

    /// Metadata of the underlying batch
    pub fn metadata(&self) -> &'a RecordMetadata {
        &self.batch.metadata
    }

    /// Read a column as double; longs widen, nulls read as NaN
    pub fn get_double(&self, column: usize) -> f64 {
        match self.batch.columns.get(column) {
            Some(Column::Double(v)) => v.get(self.row).copied().unwrap_or(f64::NAN),
            Some(Column::Long(v)) | Some(Column::Timestamp(v)) => match v.get(self.row) {
                Some(&x) if x != LONG_NULL => x as f64,
                _ => f64::NAN,
            },
            _ => f64::NAN,
        }
    }

    /// Read a column as long; nulls read as `LONG_NULL`
    pub fn get_long(&self, column: usize) -> i64 {
        match self.batch.columns.get(column) {
            Some(Column::Long(v)) | Some(Column::Timestamp(v)) => {
                v.get(self.row).copied().unwrap_or(LONG_NULL)
            }
            _ => LONG_NULL,
        }
    }

    /// Read a column as timestamp; nulls read as `TIMESTAMP_NULL`
    pub fn get_timestamp(&self, column: usize) -> Timestamp {
        match self.batch.columns.get(column) {
            Some(Column::Long(v)) | Some(Column::Timestamp(v)) => {
                v.get(self.row).copied().unwrap_or(TIMESTAMP_NULL)
            }
            _ => TIMESTAMP_NULL,
        }
    }

    /// Read a symbol column
    pub fn get_symbol(&self, column: usize) -> Option<&'a str> {
        match self.batch.columns.get(column) {
            Some(Column::Symbol(v)) => v.get(self.row).and_then(|s| s.as_deref()),
            _ => None,
        }
    }
}

// ============================================================================
// Operator Trait
// ============================================================================

/// Common interface for all query operators
///
/// Operators implement a pull-based model where downstream operators
/// request batches from upstream operators.
pub trait Operator: Send {
    /// Pull the next batch of data
    ///
    /// Returns:
    /// - `Ok(Some(batch))` - More data available
    /// - `Ok(None)` - No more data (end of stream)
    /// - `Err(e)` - Error occurred
    fn next_batch(&mut self, ctx: &mut ExecutionContext)
        -> Result<Option<RecordBatch>, QueryError>;

    /// Reset operator state for re-execution
    fn reset(&mut self);

    /// Get operator name for debugging/profiling
    fn name(&self) -> &'static str;

    /// Metadata of the batches this operator produces
    fn metadata(&self) -> Arc<RecordMetadata>;

    /// Estimated output cardinality (rows)
    fn estimated_cardinality(&self) -> usize {
        0 // Unknown by default
    }
}

// ============================================================================
// Tests
// ============================================================================
