//! Kuba SAMPLE BY - time-bucketed aggregation with gap interpolation
//!
//! This library groups an ordered stream of rows into time buckets and
//! computes aggregates per bucket and group key:
//! - Fixed (micros to days) and calendar (months, years) sampling intervals
//! - FILL(NONE): only buckets that saw rows are emitted
//! - FILL(LINEAR): skipped buckets are estimated from a group's neighbours
//! - Running great-circle distance with boundary-aware interpolation
//! - Memory budget, timeout and cancellation checked during execution

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

/// Prometheus metrics and telemetry
pub mod metrics;

/// Configuration management with TOML support
pub mod config;

/// Per-group state layout, aggregate functions, group tables and samplers
pub mod aggregation;

/// Query model, planning, execution and result formatting
pub mod query;

// Re-export main types
pub use config::Config;
pub use error::{Error, Result};
pub use query::{
    AggregateSpec, FillStrategy, QueryError, QueryErrorKind, QueryExecutor, QueryResult,
    SampleByQuery,
};
pub use types::{ColumnType, RecordMetadata, Timestamp, Value};
