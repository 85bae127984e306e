//! SAMPLE BY query pipeline
//!
//! # Architecture
//!
//! ```text
//! SampleByQuery
//!      │
//!      ▼
//! ┌─────────────┐
//! │   Plan      │  Resolve columns, bind aggregates, choose sampler
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Construct  │  Group table, memory reservation
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Execute    │  Pull rows, fold per bucket, fill gaps
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Format     │  JSON, JSON lines, CSV, table
//! └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use kuba_sampleby::query::{AggregateSpec, FillStrategy, QueryExecutor, SampleByQuery};
//! use kuba_sampleby::query::operators::ScanOperator;
//! use kuba_sampleby::types::{ColumnType, RecordMetadata, Value, MICROS_PER_MINUTE};
//! use std::sync::Arc;
//!
//! let metadata = Arc::new(
//!     RecordMetadata::builder()
//!         .column("lat", ColumnType::Double)
//!         .column("lon", ColumnType::Double)
//!         .timestamp("k")
//!         .build(),
//! );
//! let rows = (0..4).map(|i| {
//!     vec![
//!         Value::Double(i as f64),
//!         Value::Double(i as f64),
//!         Value::Timestamp(i * 30 * MICROS_PER_MINUTE),
//!     ]
//! });
//! let source = ScanOperator::from_rows(metadata, rows).unwrap();
//!
//! let query = SampleByQuery::builder()
//!     .aggregate(AggregateSpec::parse("haversine_dist_deg(lat, lon, k)").unwrap())
//!     .interval_str("1h")
//!     .unwrap()
//!     .fill(FillStrategy::Linear)
//!     .build()
//!     .unwrap();
//!
//! let result = QueryExecutor::new()
//!     .execute_sample_by(&query, Box::new(source))
//!     .unwrap();
//! assert_eq!(result.row_count(), 2);
//! ```

pub mod ast;
pub mod error;
pub mod executor;
pub mod operators;
pub mod planner;
pub mod result;

// Re-export main types
pub use ast::{AggregateSpec, FillStrategy, SampleByQuery, SampleByQueryBuilder};
pub use error::{QueryError, QueryErrorKind};
pub use executor::{ExecutionContext, ExecutorConfig, QueryExecutor};
pub use operators::{EngineState, Operator, RecordBatch, SampleByOperator, ScanOperator};
pub use planner::{FillMode, SampleByPlan, SampleByPlanner};
pub use result::{QueryResult, ResultFormat, ResultRow};
