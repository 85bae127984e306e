//! Metrics and telemetry for SAMPLE BY execution
//!
//! Prometheus counters for rows consumed, buckets and rows emitted,
//! interpolation work, and query failures by kind.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, Counter, CounterVec, Encoder, Gauge,
    TextEncoder,
};

use crate::query::error::QueryErrorKind;
use crate::query::planner::FillMode;

lazy_static! {
    // === Throughput Counters ===

    /// Rows pulled from the input and processed
    pub static ref ROWS_CONSUMED: Counter = register_counter!(
        "sampleby_rows_consumed_total",
        "Total input rows consumed by SAMPLE BY"
    ).expect("valid metric definition");

    /// Buckets emitted by fill mode
    pub static ref BUCKETS_EMITTED: CounterVec = register_counter_vec!(
        "sampleby_buckets_emitted_total",
        "Total buckets emitted by fill mode",
        &["fill"]
    ).expect("valid metric definition");

    /// Rows emitted by fill mode
    pub static ref ROWS_EMITTED: CounterVec = register_counter_vec!(
        "sampleby_rows_emitted_total",
        "Total output rows by fill mode",
        &["fill"]
    ).expect("valid metric definition");

    // === Interpolation Counters ===

    /// Rows synthesized for buckets a group skipped
    pub static ref SYNTHETIC_ROWS: Counter = register_counter!(
        "sampleby_synthetic_rows_total",
        "Total interpolated rows emitted for empty buckets"
    ).expect("valid metric definition");

    /// Boundary shares added to real buckets
    pub static ref BOUNDARY_APPORTIONMENTS: Counter = register_counter!(
        "sampleby_boundary_apportionments_total",
        "Total boundary interpolations applied to real buckets"
    ).expect("valid metric definition");

    // === Error Counters ===

    /// Failed queries by error kind
    pub static ref FAILURES_TOTAL: CounterVec = register_counter_vec!(
        "sampleby_failures_total",
        "Total failed SAMPLE BY queries by error kind",
        &["kind"]
    ).expect("valid metric definition");

    // === System Health ===

    /// Health status (0=unhealthy, 1=healthy)
    pub static ref HEALTH_STATUS: Gauge = register_gauge!(
        "sampleby_health_status",
        "Engine health status (0=unhealthy, 1=healthy)"
    ).expect("valid metric definition");
}

/// Initialize metrics system
pub fn init() {
    HEALTH_STATUS.set(1.0);
    tracing::info!("Metrics system initialized");
}

/// Get metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Metrics contain invalid UTF-8: {}", e))
}

fn fill_label(fill: FillMode) -> &'static str {
    match fill {
        FillMode::None => "none",
        FillMode::Linear => "linear",
    }
}

/// Record input rows consumed
#[inline]
pub fn record_rows_consumed(rows: usize) {
    ROWS_CONSUMED.inc_by(rows as f64);
}

/// Record one emitted bucket and its rows
#[inline]
pub fn record_bucket_emitted(fill: FillMode, rows: usize) {
    let label = fill_label(fill);
    BUCKETS_EMITTED.with_label_values(&[label]).inc();
    ROWS_EMITTED.with_label_values(&[label]).inc_by(rows as f64);
}

/// Record interpolation work of a finished query
#[inline]
pub fn record_interpolation(synthetic_rows: u64, boundaries: u64) {
    if synthetic_rows > 0 {
        SYNTHETIC_ROWS.inc_by(synthetic_rows as f64);
    }
    if boundaries > 0 {
        BOUNDARY_APPORTIONMENTS.inc_by(boundaries as f64);
    }
}

/// Record a failed query
#[inline]
pub fn record_failure(kind: QueryErrorKind) {
    FAILURES_TOTAL.with_label_values(&[kind.as_str()]).inc();
}
