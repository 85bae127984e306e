//! Query Planner - SAMPLE BY plan generation
//!
//! This module turns a [`SampleByQuery`] and the metadata of its source into
//! an immutable [`SampleByPlan`]. Every check that can fail without looking at
//! data happens here, before the engine is built:
//!
//! - the source has a designated timestamp
//! - grouping columns exist and are groupable
//! - the fill mode is executable
//! - aggregate arguments resolve to columns of the right type
//! - under FILL(LINEAR) every aggregate can interpolate
//!
//! # Planning Phases
//!
//! ```text
//! SampleByQuery + source metadata
//!     │
//!     ▼
//! ┌─────────────────┐
//! │    Resolve      │  timestamp, keys, functions, fill
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    Register     │  every function pushes its field manifest
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │      Bind       │  frozen schema hands out slots
//! └─────────────────┘
//! ```

use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::aggregation::functions::{create_function, BoundAggregate, GroupByFunction};
use crate::aggregation::key::{KeyColumn, KeySchema};
use crate::aggregation::layout::{ValueSchema, ValueSchemaBuilder};
use crate::aggregation::sampler::{SamplingInterval, TimestampSampler};
use crate::query::ast::{FillStrategy, SampleByQuery};
use crate::query::error::QueryError;
use crate::types::{ColumnType, RecordMetadata};

/// Name of the bucket timestamp column when the source has none to reuse
const DEFAULT_TIMESTAMP_NAME: &str = "timestamp";

// ============================================================================
// Plan
// ============================================================================

/// Executable fill policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMode {
    /// Empty buckets produce no rows
    None,
    /// Empty buckets between two observations of a group are interpolated
    Linear,
}

impl fmt::Display for FillMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillMode::None => write!(f, "NONE"),
            FillMode::Linear => write!(f, "LINEAR"),
        }
    }
}

/// Everything the engine needs, resolved and immutable
#[derive(Debug)]
pub struct SampleByPlan {
    /// Metadata of the source rows
    pub input_metadata: Arc<RecordMetadata>,
    /// Metadata of emitted rows: keys, aggregates, bucket timestamp
    pub output_metadata: Arc<RecordMetadata>,
    /// Designated timestamp column of the source
    pub timestamp_index: usize,
    /// Grouping columns
    pub key_schema: KeySchema,
    /// Per-group record layout
    pub value_schema: Arc<ValueSchema>,
    /// Functions bound to their slots, in output order
    pub aggregates: Vec<BoundAggregate>,
    /// Bucket boundaries
    pub sampler: Box<dyn TimestampSampler>,
    /// Bucket width as written
    pub interval: SamplingInterval,
    /// Fill policy
    pub fill: FillMode,
}

impl SampleByPlan {
    /// Human-readable plan description
    pub fn explain(&self) -> String {
        let keys: Vec<&str> = self
            .key_schema
            .columns()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        let mut out = format!(
            "SampleBy interval={} fill={} keys=[{}] record_size={}\n",
            self.interval,
            self.fill,
            keys.join(", "),
            self.value_schema.record_size()
        );
        for aggregate in &self.aggregates {
            out.push_str(&format!(
                "  {} -> {} @ offset {} ({} bytes)\n",
                aggregate.name(),
                aggregate.output_type(),
                aggregate.slot().offset(),
                aggregate.slot().len()
            ));
        }
        out
    }
}

// ============================================================================
// Planner
// ============================================================================

/// Builds [`SampleByPlan`]s
#[derive(Debug, Default, Clone)]
pub struct SampleByPlanner;

impl SampleByPlanner {
    /// Create a new planner
    pub fn new() -> Self {
        Self
    }

    /// Plan `query` against a source producing `input`
    pub fn plan(
        &self,
        query: &SampleByQuery,
        input: Arc<RecordMetadata>,
    ) -> Result<SampleByPlan, QueryError> {
        let timestamp_index = input.timestamp_index().ok_or_else(|| {
            QueryError::planning("SAMPLE BY requires a designated timestamp column")
        })?;

        let key_schema = self.resolve_keys(query, &input, timestamp_index)?;
        let fill = Self::fill_mode(query.fill)?;

        let functions = query
            .aggregates
            .iter()
            .map(|spec| create_function(spec, &input))
            .collect::<Result<Vec<_>, _>>()?;

        if fill == FillMode::Linear {
            if let Some(function) = functions.iter().find(|f| !f.supports_interpolation()) {
                return Err(QueryError::unsupported_interpolation(format!(
                    "{} does not support FILL(LINEAR)",
                    function.name()
                )));
            }
        }

        let sampler = query.interval.sampler()?;
        let (value_schema, aggregates) = Self::bind(functions)?;
        let output_metadata = Self::output_metadata(&input, timestamp_index, &key_schema, &aggregates);

        debug!(
            keys = key_schema.len(),
            aggregates = aggregates.len(),
            record_size = value_schema.record_size(),
            fill = %fill,
            "SAMPLE BY planned"
        );

        Ok(SampleByPlan {
            input_metadata: input,
            output_metadata: Arc::new(output_metadata),
            timestamp_index,
            key_schema,
            value_schema,
            aggregates,
            sampler,
            interval: query.interval,
            fill,
        })
    }

    fn resolve_keys(
        &self,
        query: &SampleByQuery,
        input: &RecordMetadata,
        timestamp_index: usize,
    ) -> Result<KeySchema, QueryError> {
        let mut columns: Vec<KeyColumn> = Vec::with_capacity(query.keys.len());
        for name in &query.keys {
            let index = input
                .column_index(name)
                .ok_or_else(|| QueryError::validation(format!("unknown key column '{}'", name)))?;
            if index == timestamp_index {
                return Err(QueryError::validation(format!(
                    "designated timestamp '{}' cannot be a grouping key",
                    name
                )));
            }
            if columns.iter().any(|c| c.input_index == index) {
                return Err(QueryError::validation(format!("duplicate key column '{}'", name)));
            }

            let column_type = input
                .column_type(index)
                .ok_or_else(|| QueryError::internal(format!("column '{}' has no type", name)))?;
            if column_type == ColumnType::Double {
                return Err(QueryError::validation(format!(
                    "cannot group by DOUBLE column '{}'",
                    name
                )));
            }

            columns.push(KeyColumn {
                name: name.clone(),
                column_type,
                input_index: index,
            });
        }
        Ok(KeySchema::new(columns))
    }

    fn fill_mode(fill: FillStrategy) -> Result<FillMode, QueryError> {
        match fill {
            FillStrategy::None => Ok(FillMode::None),
            FillStrategy::Linear => Ok(FillMode::Linear),
            other => Err(QueryError::planning(format!(
                "FILL({}) is not supported by SAMPLE BY",
                other
            ))),
        }
    }

    /// Register every manifest, freeze the schema, then hand out slots
    fn bind(
        functions: Vec<Box<dyn GroupByFunction>>,
    ) -> Result<(Arc<ValueSchema>, Vec<BoundAggregate>), QueryError> {
        let mut builder = ValueSchemaBuilder::new();
        let bases: Vec<usize> = functions
            .iter()
            .map(|f| builder.register(f.value_types()))
            .collect();
        let schema = Arc::new(builder.build());

        let aggregates = functions
            .into_iter()
            .zip(bases)
            .map(|(function, base)| {
                let slot = schema
                    .slot(base, function.value_types().len())
                    .ok_or_else(|| {
                        QueryError::internal(format!("no slot for {} at {}", function.name(), base))
                    })?;
                Ok(BoundAggregate::new(function, slot))
            })
            .collect::<Result<Vec<_>, QueryError>>()?;

        Ok((schema, aggregates))
    }

    fn output_metadata(
        input: &RecordMetadata,
        timestamp_index: usize,
        keys: &KeySchema,
        aggregates: &[BoundAggregate],
    ) -> RecordMetadata {
        let mut builder = RecordMetadata::builder();
        for key in keys.columns() {
            builder = builder.column(key.name.clone(), key.column_type);
        }
        for aggregate in aggregates {
            builder = builder.column(aggregate.name(), aggregate.output_type());
        }
        let timestamp_name = input
            .column(timestamp_index)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| DEFAULT_TIMESTAMP_NAME.to_string());
        builder.timestamp(timestamp_name).build()
    }
}

// ============================================================================
// Tests
// ============================================================================
