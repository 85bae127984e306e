//! Group-by aggregate functions
//!
//! Each aggregate declares the typed fields it needs ([`GroupByFunction::value_types`]),
//! is bound to a resolved [`ValueSlot`] at plan time, and from then on only
//! reads and writes its own block of the per-group record.
//!
//! Interpolation is a separate capability: a function that can synthesize
//! values for empty buckets returns an [`Interpolate`] implementation from
//! [`GroupByFunction::interpolation`]. The planner refuses FILL(LINEAR) for any
//! function that returns `None`, so the engine never calls interpolation on a
//! function that cannot do it.
//!
//! # Functions
//!
//! | Name | Fields | Output | Interpolates |
//! |------|--------|--------|--------------|
//! | `count()` | long | LONG | no |
//! | `sum(x)` | double | DOUBLE | no |
//! | `haversine_dist_deg(lat, lon, ts)` | 7 | DOUBLE | yes |

mod count;
mod haversine;
mod sum;

pub use count::Count;
pub use haversine::{haversine_distance_deg, HaversineDistDegree, EARTH_RADIUS_KM};
pub use sum::Sum;

use std::fmt;

use crate::aggregation::layout::{RecordValue, StateBlock, StateBlockMut, ValueSlot, ValueType};
use crate::query::ast::AggregateSpec;
use crate::query::error::QueryError;
use crate::query::operators::RowRef;
use crate::types::{ColumnType, RecordMetadata, Timestamp, Value};

/// Which side of a bucket boundary receives an apportioned share
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundarySide {
    /// The earlier bucket is being closed; its total receives the share
    Closing,
    /// The later bucket is being opened; its total receives the share
    Opening,
}

/// An aggregate computed per group and bucket
pub trait GroupByFunction: fmt::Debug + Send {
    /// Display name, also used as the output column name
    fn name(&self) -> &str;

    /// Field manifest registered with the value schema
    fn value_types(&self) -> &'static [ValueType];

    /// Type of the extracted value
    fn output_type(&self) -> ColumnType;

    /// First row of a group in a bucket
    fn init(&self, state: &mut StateBlockMut<'_>, row: &RowRef<'_>);

    /// Every subsequent row of the group in the same bucket
    fn accumulate(&self, state: &mut StateBlockMut<'_>, row: &RowRef<'_>);

    /// Final value of the group
    fn extract(&self, state: &StateBlock<'_>) -> Value;

    /// Put the block into its empty form
    fn reset(&self, state: &mut StateBlockMut<'_>);

    /// Interpolation capability, if any
    fn interpolation(&self) -> Option<&dyn Interpolate> {
        None
    }

    /// Whether the function may be used with FILL(LINEAR)
    fn supports_interpolation(&self) -> bool {
        self.interpolation().is_some()
    }
}

/// Synthesis of values for buckets a group skipped
pub trait Interpolate {
    /// Write the value of one synthetic bucket between `before` and `after`
    ///
    /// `result` has been reset; the synthetic value is its entire content.
    fn interpolate_gap(
        &self,
        result: &mut StateBlockMut<'_>,
        before: &StateBlock<'_>,
        after: &StateBlock<'_>,
        bucket_duration: i64,
    );

    /// Add the share of the interval straddling `boundary` to one side
    fn interpolate_boundary(
        &self,
        before: &mut StateBlockMut<'_>,
        after: &mut StateBlockMut<'_>,
        boundary: Timestamp,
        side: BoundarySide,
    );
}

/// Instantiate the function described by `spec` against the input columns
pub fn create_function(
    spec: &AggregateSpec,
    metadata: &RecordMetadata,
) -> Result<Box<dyn GroupByFunction>, QueryError> {
    match spec {
        AggregateSpec::Count => Ok(Box::new(Count::new())),
        AggregateSpec::Sum { column } => {
            let index = resolve_column(metadata, column, &[ColumnType::Double, ColumnType::Long])?;
            Ok(Box::new(Sum::new(column.clone(), index)))
        }
        AggregateSpec::HaversineDistDeg { lat, lon, ts } => {
            let lat_index = resolve_column(metadata, lat, &[ColumnType::Double])?;
            let lon_index = resolve_column(metadata, lon, &[ColumnType::Double])?;
            let ts_index = resolve_column(metadata, ts, &[ColumnType::Timestamp])?;
            Ok(Box::new(HaversineDistDegree::new(
                format!("haversine_dist_deg({}, {}, {})", lat, lon, ts),
                lat_index,
                lon_index,
                ts_index,
            )))
        }
    }
}

fn resolve_column(
    metadata: &RecordMetadata,
    name: &str,
    accepted: &[ColumnType],
) -> Result<usize, QueryError> {
    let index = metadata
        .column_index(name)
        .ok_or_else(|| QueryError::validation(format!("unknown column '{}'", name)))?;
    let column_type = metadata
        .column_type(index)
        .ok_or_else(|| QueryError::internal(format!("column '{}' has no type", name)))?;

    if !accepted.contains(&column_type) {
        return Err(QueryError::validation(format!(
            "column '{}' has type {}, expected one of {:?}",
            name, column_type, accepted
        )));
    }
    Ok(index)
}

/// A function bound to its resolved slot in the group record
#[derive(Debug)]
pub struct BoundAggregate {
    function: Box<dyn GroupByFunction>,
    slot: ValueSlot,
}

impl BoundAggregate {
    /// Bind a function to a slot
    pub fn new(function: Box<dyn GroupByFunction>, slot: ValueSlot) -> Self {
        Self { function, slot }
    }

    /// The underlying function
    pub fn function(&self) -> &dyn GroupByFunction {
        self.function.as_ref()
    }

    /// Resolved slot
    pub fn slot(&self) -> &ValueSlot {
        &self.slot
    }

    /// Output column name
    pub fn name(&self) -> &str {
        self.function.name()
    }

    /// Output column type
    pub fn output_type(&self) -> ColumnType {
        self.function.output_type()
    }

    /// Start the group's state from `row`
    pub fn init(&self, record: &mut RecordValue, row: &RowRef<'_>) {
        self.function.init(&mut record.block_mut(&self.slot), row);
    }

    /// Fold `row` into the group's state
    pub fn accumulate(&self, record: &mut RecordValue, row: &RowRef<'_>) {
        self.function.accumulate(&mut record.block_mut(&self.slot), row);
    }

    /// Reset the group's state
    pub fn reset(&self, record: &mut RecordValue) {
        self.function.reset(&mut record.block_mut(&self.slot));
    }

    /// Extract the group's value
    pub fn extract(&self, record: &RecordValue) -> Value {
        self.function.extract(&record.block(&self.slot))
    }

    /// Fill a synthetic record between `before` and `after`
    ///
    /// No-op for functions without the capability; the planner rejects
    /// those under FILL(LINEAR).
    pub fn interpolate_gap(
        &self,
        result: &mut RecordValue,
        before: &RecordValue,
        after: &RecordValue,
        bucket_duration: i64,
    ) {
        if let Some(interpolation) = self.function.interpolation() {
            interpolation.interpolate_gap(
                &mut result.block_mut(&self.slot),
                &before.block(&self.slot),
                &after.block(&self.slot),
                bucket_duration,
            );
        }
    }

    /// Apportion the interval straddling `boundary` to one side
    pub fn interpolate_boundary(
        &self,
        before: &mut RecordValue,
        after: &mut RecordValue,
        boundary: Timestamp,
        side: BoundarySide,
    ) {
        if let Some(interpolation) = self.function.interpolation() {
            interpolation.interpolate_boundary(
                &mut before.block_mut(&self.slot),
                &mut after.block_mut(&self.slot),
                boundary,
                side,
            );
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::error::QueryErrorKind;

    fn metadata() -> RecordMetadata {
        RecordMetadata::builder()
            .column("s", ColumnType::Symbol)
            .column("lat", ColumnType::Double)
            .column("lon", ColumnType::Double)
            .column("n", ColumnType::Long)
            .timestamp("k")
            .build()
    }

    #[test]
    fn test_create_functions() {
        let metadata = metadata();
        let count = create_function(&AggregateSpec::Count, &metadata).unwrap();
        assert_eq!(count.name(), "count()");
        assert!(!count.supports_interpolation());

        let sum = create_function(&AggregateSpec::Sum { column: "n".into() }, &metadata).unwrap();
        assert_eq!(sum.name(), "sum(n)");
        assert_eq!(sum.output_type(), ColumnType::Double);

        let dist = create_function(
            &AggregateSpec::HaversineDistDeg {
                lat: "lat".into(),
                lon: "lon".into(),
                ts: "k".into(),
            },
            &metadata,
        )
        .unwrap();
        assert_eq!(dist.name(), "haversine_dist_deg(lat, lon, k)");
        assert!(dist.supports_interpolation());
        assert_eq!(dist.value_types().len(), 7);
    }

    #[test]
    fn test_create_rejects_bad_columns() {
        let metadata = metadata();
        let err = create_function(&AggregateSpec::Sum { column: "nope".into() }, &metadata)
            .unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::ValidationError);

        let err = create_function(
            &AggregateSpec::HaversineDistDeg {
                lat: "s".into(),
                lon: "lon".into(),
                ts: "k".into(),
            },
            &metadata,
        )
        .unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::ValidationError);
        assert!(err.message.contains("'s'"));
    }

    #[test]
    fn test_non_interpolating_bound_aggregate() {
        use crate::aggregation::layout::ValueSchemaBuilder;

        let function = create_function(&AggregateSpec::Count, &metadata()).unwrap();
        let mut builder = ValueSchemaBuilder::new();
        let base = builder.register(function.value_types());
        let schema = builder.build();
        let slot = schema.slot(base, function.value_types().len()).unwrap();
        let bound = BoundAggregate::new(function, slot);

        assert!(!bound.function().supports_interpolation());

        let mut a = schema.new_record();
        let mut b = schema.new_record();
        let mut r = schema.new_record();
        bound.interpolate_gap(&mut r, &a, &b, 10);
        bound.interpolate_boundary(&mut a, &mut b, 5, BoundarySide::Closing);
        assert_eq!(r, schema.new_record());
        assert_eq!(a, schema.new_record());
        assert_eq!(b, schema.new_record());
    }
}
