//! Running great-circle distance over a group's path
//!
//! `haversine_dist_deg(lat, lon, ts)` treats the rows of a group as a path of
//! points in degrees and sums the haversine distance between consecutive
//! valid points. Rows with a null latitude or longitude are skipped without
//! breaking the path.
//!
//! State block layout:
//!
//! | Field | Type | Meaning |
//! |-------|------|---------|
//! | 0 | double | first latitude |
//! | 1 | double | first longitude |
//! | 2 | timestamp | first timestamp |
//! | 3 | double | last latitude |
//! | 4 | double | last longitude |
//! | 5 | timestamp | last timestamp |
//! | 6 | double | total distance |
//!
//! The first/last snapshots are what FILL(LINEAR) uses to estimate distance
//! travelled in buckets where the group had no rows.

use tracing::trace;

use super::{BoundarySide, GroupByFunction, Interpolate};
use crate::aggregation::layout::{StateBlock, StateBlockMut, ValueType};
use crate::query::operators::RowRef;
use crate::types::{ColumnType, Timestamp, Value, TIMESTAMP_NULL};

/// Mean Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.088;

const FIRST_LAT: usize = 0;
const FIRST_LON: usize = 1;
const FIRST_TS: usize = 2;
const LAST_LAT: usize = 3;
const LAST_LON: usize = 4;
const LAST_TS: usize = 5;
const DISTANCE: usize = 6;

const VALUE_TYPES: &[ValueType] = &[
    ValueType::Double,
    ValueType::Double,
    ValueType::Timestamp,
    ValueType::Double,
    ValueType::Double,
    ValueType::Timestamp,
    ValueType::Double,
];

/// Great-circle distance in kilometres between two points given in degrees
///
/// Depends only on the central angle, so it is unaffected by where the
/// antimeridian falls, and returns exactly 0 for identical points.
pub fn haversine_distance_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1 = lat1.to_radians();
    let lon1 = lon1.to_radians();
    let lat2 = lat2.to_radians();
    let lon2 = lon2.to_radians();

    let half_lat = (lat2 - lat1) / 2.0;
    let half_lon = (lon2 - lon1) / 2.0;
    let a = half_lat.sin() * half_lat.sin()
        + lat1.cos() * lat2.cos() * half_lon.sin() * half_lon.sin();
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Endpoints of the interval between the last point of `before` and the
/// first point of `after`
struct Span {
    distance: f64,
    start: Timestamp,
    end: Timestamp,
}

impl Span {
    /// `None` when either endpoint is missing or the interval is empty
    fn between(before: &StateBlock<'_>, after: &StateBlock<'_>) -> Option<Self> {
        let lat1 = before.get_double(LAST_LAT);
        let lon1 = before.get_double(LAST_LON);
        let start = before.get_timestamp(LAST_TS);
        let lat2 = after.get_double(FIRST_LAT);
        let lon2 = after.get_double(FIRST_LON);
        let end = after.get_timestamp(FIRST_TS);

        if lat1.is_nan() || lon1.is_nan() || lat2.is_nan() || lon2.is_nan() {
            return None;
        }
        if start == TIMESTAMP_NULL || end == TIMESTAMP_NULL || end <= start {
            return None;
        }

        Some(Self {
            distance: haversine_distance_deg(lat1, lon1, lat2, lon2),
            start,
            end,
        })
    }

    /// Share of the distance covered over `length` microseconds
    fn share(&self, length: i64) -> f64 {
        (length as f64 * self.distance) / (self.end - self.start) as f64
    }
}

/// `haversine_dist_deg(lat, lon, ts)`
#[derive(Debug, Clone)]
pub struct HaversineDistDegree {
    name: String,
    lat: usize,
    lon: usize,
    ts: usize,
}

impl HaversineDistDegree {
    /// Create the function over the given input column indexes
    pub fn new(name: impl Into<String>, lat: usize, lon: usize, ts: usize) -> Self {
        Self {
            name: name.into(),
            lat,
            lon,
            ts,
        }
    }

    fn set_last(state: &mut StateBlockMut<'_>, lat: f64, lon: f64, ts: Timestamp) {
        state.set_double(LAST_LAT, lat);
        state.set_double(LAST_LON, lon);
        state.set_timestamp(LAST_TS, ts);
    }
}

impl GroupByFunction for HaversineDistDegree {
    fn name(&self) -> &str {
        &self.name
    }

    fn value_types(&self) -> &'static [ValueType] {
        VALUE_TYPES
    }

    fn output_type(&self) -> ColumnType {
        ColumnType::Double
    }

    fn init(&self, state: &mut StateBlockMut<'_>, row: &RowRef<'_>) {
        let lat = row.get_double(self.lat);
        let lon = row.get_double(self.lon);
        let ts = row.get_timestamp(self.ts);

        state.set_double(FIRST_LAT, lat);
        state.set_double(FIRST_LON, lon);
        state.set_timestamp(FIRST_TS, ts);
        Self::set_last(state, lat, lon, ts);
        state.set_double(DISTANCE, 0.0);
    }

    fn accumulate(&self, state: &mut StateBlockMut<'_>, row: &RowRef<'_>) {
        let lat = row.get_double(self.lat);
        let lon = row.get_double(self.lon);
        let ts = row.get_timestamp(self.ts);

        let last_lat = state.get_double(LAST_LAT);
        let last_lon = state.get_double(LAST_LON);

        if last_lat.is_nan() || last_lon.is_nan() {
            // nothing valid seen yet, this row becomes the path start
            Self::set_last(state, lat, lon, ts);
            let first_missing =
                state.get_double(FIRST_LAT).is_nan() || state.get_double(FIRST_LON).is_nan();
            if !lat.is_nan() && !lon.is_nan() && first_missing {
                state.set_double(FIRST_LAT, lat);
                state.set_double(FIRST_LON, lon);
                state.set_timestamp(FIRST_TS, ts);
            }
            return;
        }

        if lat.is_nan() || lon.is_nan() {
            return;
        }

        state.add_double(DISTANCE, haversine_distance_deg(last_lat, last_lon, lat, lon));
        Self::set_last(state, lat, lon, ts);
    }

    fn extract(&self, state: &StateBlock<'_>) -> Value {
        let distance = state.get_double(DISTANCE);
        Value::Double(if distance.is_nan() { 0.0 } else { distance })
    }

    fn reset(&self, state: &mut StateBlockMut<'_>) {
        state.set_double(FIRST_LAT, f64::NAN);
        state.set_double(FIRST_LON, f64::NAN);
        state.set_timestamp(FIRST_TS, TIMESTAMP_NULL);
        Self::set_last(state, f64::NAN, f64::NAN, TIMESTAMP_NULL);
        state.set_double(DISTANCE, 0.0);
    }

    fn interpolation(&self) -> Option<&dyn Interpolate> {
        Some(self)
    }
}

impl Interpolate for HaversineDistDegree {
    fn interpolate_gap(
        &self,
        result: &mut StateBlockMut<'_>,
        before: &StateBlock<'_>,
        after: &StateBlock<'_>,
        bucket_duration: i64,
    ) {
        let value = Span::between(before, after)
            .map(|span| span.share(bucket_duration))
            .unwrap_or(0.0);
        trace!(bucket_duration, value, "Interpolated gap distance");
        result.set_double(DISTANCE, value);
    }

    fn interpolate_boundary(
        &self,
        before: &mut StateBlockMut<'_>,
        after: &mut StateBlockMut<'_>,
        boundary: Timestamp,
        side: BoundarySide,
    ) {
        let Some(span) = Span::between(&before.as_block(), &after.as_block()) else {
            return;
        };

        match side {
            BoundarySide::Closing => {
                let share = span.share(boundary.saturating_sub(span.start).max(0));
                before.add_double(DISTANCE, share);
            }
            BoundarySide::Opening => {
                let share = span.share(span.end.saturating_sub(boundary).max(0));
                after.add_double(DISTANCE, share);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
