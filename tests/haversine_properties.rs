//! Property tests for the distance aggregate and LINEAR gap filling

use std::sync::Arc;

use kuba_sampleby::aggregation::functions::{haversine_distance_deg, EARTH_RADIUS_KM};
use kuba_sampleby::query::operators::ScanOperator;
use kuba_sampleby::query::{AggregateSpec, FillStrategy, QueryExecutor, SampleByQuery};
use kuba_sampleby::types::{ColumnType, RecordMetadata, Value, MICROS_PER_HOUR};
use proptest::prelude::*;

fn coordinate() -> impl Strategy<Value = (f64, f64)> {
    (-89.0f64..89.0, -179.0f64..179.0)
}

/// Points with strictly increasing timestamps, steps up to four hours
fn track() -> impl Strategy<Value = Vec<(f64, f64, i64)>> {
    prop::collection::vec((coordinate(), 1i64..4 * MICROS_PER_HOUR), 1..40).prop_map(|steps| {
        let mut ts = 0;
        steps
            .into_iter()
            .map(|((lat, lon), dt)| {
                ts += dt;
                (lat, lon, ts)
            })
            .collect()
    })
}

fn sample_hourly(points: &[(f64, f64, i64)], fill: FillStrategy) -> Vec<f64> {
    let metadata = Arc::new(
        RecordMetadata::builder()
            .column("lat", ColumnType::Double)
            .column("lon", ColumnType::Double)
            .timestamp("k")
            .build(),
    );
    let rows = points
        .iter()
        .map(|&(lat, lon, ts)| vec![Value::Double(lat), Value::Double(lon), Value::Timestamp(ts)]);
    let source = ScanOperator::from_rows(metadata, rows)
        .unwrap()
        .with_batch_size(5);
    let query = SampleByQuery::builder()
        .aggregate(AggregateSpec::parse("haversine_dist_deg(lat, lon, k)").unwrap())
        .interval_str("1h")
        .unwrap()
        .fill(fill)
        .build()
        .unwrap();

    let result = QueryExecutor::new()
        .execute_sample_by(&query, Box::new(source))
        .unwrap();
    result
        .rows
        .iter()
        .map(|r| r.values[0].as_f64().unwrap())
        .collect()
}

#[test]
fn distance_ignores_antimeridian_position() {
    let path = |lon0: f64| -> Vec<(f64, f64, i64)> {
        (0..10)
            .map(|i| (0.0, lon0 + i as f64, i * 60_000_000))
            .collect()
    };

    let east = sample_hourly(&path(0.0), FillStrategy::None);
    let west = sample_hourly(&path(-180.0), FillStrategy::None);
    assert_eq!(east.len(), 1);
    assert_eq!(west.len(), 1);
    assert!((east[0] - west[0]).abs() < 1e-4, "{} != {}", east[0], west[0]);

    let expected = 9.0 * haversine_distance_deg(0.0, 0.0, 0.0, 1.0);
    assert!((east[0] - expected).abs() < 1e-4);
}

proptest! {
    #[test]
    fn distance_is_symmetric((lat1, lon1) in coordinate(), (lat2, lon2) in coordinate()) {
        let ab = haversine_distance_deg(lat1, lon1, lat2, lon2);
        let ba = haversine_distance_deg(lat2, lon2, lat1, lon1);
        prop_assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn distance_is_bounded((lat1, lon1) in coordinate(), (lat2, lon2) in coordinate()) {
        let d = haversine_distance_deg(lat1, lon1, lat2, lon2);
        prop_assert!(d >= 0.0);
        prop_assert!(d <= std::f64::consts::PI * EARTH_RADIUS_KM + 1e-9);
    }

    #[test]
    fn distance_to_self_is_zero((lat, lon) in coordinate()) {
        prop_assert_eq!(haversine_distance_deg(lat, lon, lat, lon), 0.0);
    }

    #[test]
    fn distance_is_periodic_in_longitude((lat1, lon1) in coordinate(), (lat2, lon2) in coordinate()) {
        let d = haversine_distance_deg(lat1, lon1, lat2, lon2);
        let shifted = haversine_distance_deg(lat1, lon1 + 360.0, lat2, lon2);
        prop_assert!((d - shifted).abs() < 1e-6);
    }

    #[test]
    fn fill_none_keeps_only_in_bucket_segments(points in track()) {
        let expected: f64 = points
            .windows(2)
            .filter(|w| w[0].2 / MICROS_PER_HOUR == w[1].2 / MICROS_PER_HOUR)
            .map(|w| haversine_distance_deg(w[0].0, w[0].1, w[1].0, w[1].1))
            .sum();
        let total: f64 = sample_hourly(&points, FillStrategy::None).iter().sum();
        prop_assert!((total - expected).abs() < 1e-6 * expected.max(1.0));
    }

    #[test]
    fn fill_linear_spreads_gap_segments(points in track()) {
        // adjacent buckets are not apportioned, skipped buckets are
        let expected: f64 = points
            .windows(2)
            .filter(|w| {
                let a = w[0].2 / MICROS_PER_HOUR;
                let b = w[1].2 / MICROS_PER_HOUR;
                a == b || b > a + 1
            })
            .map(|w| haversine_distance_deg(w[0].0, w[0].1, w[1].0, w[1].1))
            .sum();
        let buckets = sample_hourly(&points, FillStrategy::Linear);
        let total: f64 = buckets.iter().sum();
        prop_assert!((total - expected).abs() < 1e-6 * expected.max(1.0));

        let first = points[0].2 / MICROS_PER_HOUR;
        let last = points[points.len() - 1].2 / MICROS_PER_HOUR;
        prop_assert_eq!(buckets.len() as i64, last - first + 1);
    }
}
