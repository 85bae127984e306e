//! Core data types shared by the sampling engine
//!
//! # Key Types
//!
//! - **`Timestamp`**: microseconds since the Unix epoch
//! - **`ColumnType`**: physical type of an input or output column
//! - **`RecordMetadata`**: ordered column descriptors plus the designated timestamp
//! - **`Value`**: a single typed cell, used for extracted aggregates and result rows
//!
//! Null handling follows the columnar convention used throughout the engine:
//! doubles are null when NaN, longs and timestamps are null when equal to
//! their reserved sentinel, symbols are null when `None`.
//!
//! # Example
//!
//! ```rust
//! use kuba_sampleby::types::{ColumnType, RecordMetadata};
//!
//! let metadata = RecordMetadata::builder()
//!     .column("s", ColumnType::Symbol)
//!     .column("lat", ColumnType::Double)
//!     .column("lon", ColumnType::Double)
//!     .timestamp("k")
//!     .build();
//!
//! assert_eq!(metadata.column_index("lon"), Some(2));
//! assert_eq!(metadata.timestamp_index(), Some(3));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Microseconds since the Unix epoch
pub type Timestamp = i64;

/// Reserved sentinel for a null timestamp
pub const TIMESTAMP_NULL: Timestamp = i64::MIN;

/// Reserved sentinel for a null long
pub const LONG_NULL: i64 = i64::MIN;

/// Microseconds per millisecond
pub const MICROS_PER_MILLI: i64 = 1_000;

/// Microseconds per second
pub const MICROS_PER_SECOND: i64 = 1_000_000;

/// Microseconds per minute
pub const MICROS_PER_MINUTE: i64 = 60 * MICROS_PER_SECOND;

/// Microseconds per hour
pub const MICROS_PER_HOUR: i64 = 60 * MICROS_PER_MINUTE;

/// Microseconds per day
pub const MICROS_PER_DAY: i64 = 24 * MICROS_PER_HOUR;

/// Physical type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// 64-bit float, NaN is null
    Double,
    /// 64-bit signed integer, `LONG_NULL` is null
    Long,
    /// Microsecond timestamp, `TIMESTAMP_NULL` is null
    Timestamp,
    /// Dictionary-encoded string, `None` is null
    Symbol,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Double => write!(f, "DOUBLE"),
            ColumnType::Long => write!(f, "LONG"),
            ColumnType::Timestamp => write!(f, "TIMESTAMP"),
            ColumnType::Symbol => write!(f, "SYMBOL"),
        }
    }
}

impl std::str::FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "double" => Ok(ColumnType::Double),
            "long" => Ok(ColumnType::Long),
            "timestamp" => Ok(ColumnType::Timestamp),
            "symbol" => Ok(ColumnType::Symbol),
            other => Err(format!("unknown column type '{}'", other)),
        }
    }
}

/// Name and type of a single column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// Column name
    pub name: String,
    /// Column type
    pub column_type: ColumnType,
}

/// Ordered column descriptors of a record stream
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordMetadata {
    columns: Vec<ColumnMeta>,
    timestamp_index: Option<usize>,
}

impl RecordMetadata {
    /// Start building metadata column by column
    pub fn builder() -> RecordMetadataBuilder {
        RecordMetadataBuilder::default()
    }

    /// Number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// All column descriptors in order
    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    /// Column descriptor at `index`
    pub fn column(&self, index: usize) -> Option<&ColumnMeta> {
        self.columns.get(index)
    }

    /// Type of the column at `index`
    pub fn column_type(&self, index: usize) -> Option<ColumnType> {
        self.columns.get(index).map(|c| c.column_type)
    }

    /// Position of the column called `name`
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Designated timestamp column, if any
    pub fn timestamp_index(&self) -> Option<usize> {
        self.timestamp_index
    }
}

/// Builder for [`RecordMetadata`]
#[derive(Debug, Default)]
pub struct RecordMetadataBuilder {
    columns: Vec<ColumnMeta>,
    timestamp_index: Option<usize>,
}

impl RecordMetadataBuilder {
    /// Append a regular column
    pub fn column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(ColumnMeta {
            name: name.into(),
            column_type,
        });
        self
    }

    /// Append the designated timestamp column
    pub fn timestamp(mut self, name: impl Into<String>) -> Self {
        self.timestamp_index = Some(self.columns.len());
        self.column(name, ColumnType::Timestamp)
    }

    /// Finish the metadata
    pub fn build(self) -> RecordMetadata {
        RecordMetadata {
            columns: self.columns,
            timestamp_index: self.timestamp_index,
        }
    }
}

/// A single typed cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Double cell, NaN is null
    Double(f64),
    /// Long cell, `LONG_NULL` is null
    Long(i64),
    /// Timestamp cell, `TIMESTAMP_NULL` is null
    Timestamp(Timestamp),
    /// Symbol cell
    Symbol(Option<String>),
}

impl Value {
    /// Whether the cell holds its type's null
    pub fn is_null(&self) -> bool {
        match self {
            Value::Double(v) => v.is_nan(),
            Value::Long(v) => *v == LONG_NULL,
            Value::Timestamp(v) => *v == TIMESTAMP_NULL,
            Value::Symbol(v) => v.is_none(),
        }
    }

    /// Numeric view of the cell (None for symbols and nulls)
    pub fn as_f64(&self) -> Option<f64> {
        if self.is_null() {
            return None;
        }
        match self {
            Value::Double(v) => Some(*v),
            Value::Long(v) | Value::Timestamp(v) => Some(*v as f64),
            Value::Symbol(_) => None,
        }
    }

    /// Type of the cell
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Double(_) => ColumnType::Double,
            Value::Long(_) => ColumnType::Long,
            Value::Timestamp(_) => ColumnType::Timestamp,
            Value::Symbol(_) => ColumnType::Symbol,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return Ok(());
        }
        match self {
            Value::Double(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Timestamp(v) => write!(f, "{}", v),
            Value::Symbol(v) => write!(f, "{}", v.as_deref().unwrap_or_default()),
        }
    }
}
