//! SAMPLE BY Operator - time-bucketed group aggregation with gap filling
//!
//! Consumes rows in designated timestamp order, assigns each row to the
//! bucket its timestamp falls in, and folds it into the state of its group.
//! When a row lands in a later bucket the current bucket is closed and
//! emitted.
//!
//! # State Machine
//!
//! ```text
//!            ┌──────────────────┐  row in later bucket  ┌──────────────────┐
//!  start ──► │ ScanningBucket   │ ────────────────────► │ EmittingBucket   │
//!            │ init/accumulate  │ ◄──────────────────── │ flush or buffer  │
//!            └────────┬─────────┘    more input         └────────┬─────────┘
//!                     │ no rows at all                           │ input exhausted
//!                     ▼                                          ▼
//!                  ┌──────┐                                  ┌──────┐
//!                  │ Done │ ◄──────────────────────────────  │ Done │
//!                  └──────┘                                  └──────┘
//! ```
//!
//! Any error moves the operator to `Failed`. Rows already returned are not
//! retracted; later calls keep failing.
//!
//! # Fill Modes
//!
//! - **NONE**: each closed bucket emits the groups observed in it, then the
//!   group table is cleared. Buckets without rows emit nothing.
//! - **LINEAR**: closed buckets are buffered as frames. When a group reappears
//!   after skipping buckets, every skipped bucket gets a synthetic row from
//!   [`Interpolate::interpolate_gap`], and the interval straddling the gap is
//!   apportioned to the closing and reopening buckets with
//!   [`Interpolate::interpolate_boundary`]. A frame is emitted once every
//!   group has been seen at or after it, so no later gap can still touch it.
//!   Nothing is synthesized before a group's first or after its last bucket.
//!
//! [`Interpolate::interpolate_gap`]: crate::aggregation::functions::Interpolate::interpolate_gap
//! [`Interpolate::interpolate_boundary`]: crate::aggregation::functions::Interpolate::interpolate_boundary

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::aggregation::functions::BoundarySide;
use crate::aggregation::group_table::{create_group_table, GroupRecord, GroupTable};
use crate::aggregation::key::{GroupKey, KeySink};
use crate::metrics;
use crate::query::error::QueryError;
use crate::query::executor::{ExecutionContext, ExecutorConfig};
use crate::query::operators::{Operator, RecordBatch, RowRef};
use crate::query::planner::{FillMode, SampleByPlan};
use crate::types::{RecordMetadata, Timestamp, Value, TIMESTAMP_NULL};

// ============================================================================
// Engine State
// ============================================================================

/// Lifecycle of the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Folding rows of the current bucket
    ScanningBucket,
    /// Closing the current bucket
    EmittingBucket,
    /// All output produced
    Done,
    /// An error ended execution
    Failed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::ScanningBucket => write!(f, "SCANNING_BUCKET"),
            EngineState::EmittingBucket => write!(f, "EMITTING_BUCKET"),
            EngineState::Done => write!(f, "DONE"),
            EngineState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Counters collected while the operator runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Rows folded into group state
    pub rows_consumed: u64,
    /// Rows skipped because their designated timestamp was null
    pub rows_skipped: u64,
    /// Buckets closed
    pub buckets_closed: u64,
    /// Groups created across all buckets
    pub groups_created: u64,
    /// Interpolated rows emitted for skipped buckets
    pub synthetic_rows: u64,
    /// Boundary shares added to real buckets
    pub boundary_apportionments: u64,
    /// Rows emitted
    pub rows_emitted: u64,
}

/// Half-open `[start, end)` bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bucket {
    start: Timestamp,
    end: Timestamp,
}

// ============================================================================
// Linear Fill Buffer
// ============================================================================

/// Closed bucket waiting for emission
#[derive(Debug, Default)]
struct BucketFrame {
    entries: Vec<(GroupKey, GroupRecord)>,
    index: HashMap<GroupKey, usize>,
}

impl BucketFrame {
    fn from_entries(entries: Vec<(GroupKey, GroupRecord)>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, (k, _))| (k.clone(), i))
            .collect();
        Self { entries, index }
    }

    fn push(&mut self, key: GroupKey, record: GroupRecord) {
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, record));
    }

    fn record(&self, key: &GroupKey) -> Option<&GroupRecord> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    fn record_mut(&mut self, key: &GroupKey) -> Option<&mut GroupRecord> {
        self.index.get(key).map(|&i| &mut self.entries[i].1)
    }
}

/// Frames and per-group bookkeeping for FILL(LINEAR)
#[derive(Debug, Default)]
struct LinearFill {
    /// Closed buckets by start, real and synthetic rows
    frames: BTreeMap<Timestamp, BucketFrame>,
    /// Start of the last real bucket each group was observed in
    last_seen: HashMap<GroupKey, Timestamp>,
}

impl LinearFill {
    /// Buffer a closed bucket and reconcile the gaps it ends
    fn close_bucket(
        &mut self,
        plan: &SampleByPlan,
        bucket: Bucket,
        entries: Vec<(GroupKey, GroupRecord)>,
        ctx: &mut ExecutionContext,
        stats: &mut EngineStats,
    ) -> Result<(), QueryError> {
        let mut frame = BucketFrame::from_entries(entries);
        let keys: Vec<GroupKey> = frame.entries.iter().map(|(k, _)| k.clone()).collect();

        for key in keys {
            if let Some(&previous) = self.last_seen.get(&key) {
                let previous_end = plan.sampler.next_boundary(previous);
                if previous_end < bucket.start {
                    self.fill_gap(plan, &key, previous, previous_end, bucket.start, &mut frame, ctx, stats)?;
                }
            }
            self.last_seen.insert(key, bucket.start);
        }

        self.frames.insert(bucket.start, frame);
        Ok(())
    }

    /// Synthesize the buckets in `[gap_start, gap_end)` for `key` and
    /// apportion the straddling interval to both real neighbours
    #[allow(clippy::too_many_arguments)]
    fn fill_gap(
        &mut self,
        plan: &SampleByPlan,
        key: &GroupKey,
        previous: Timestamp,
        gap_start: Timestamp,
        gap_end: Timestamp,
        frame: &mut BucketFrame,
        ctx: &mut ExecutionContext,
        stats: &mut EngineStats,
    ) -> Result<(), QueryError> {
        let missing = || {
            QueryError::internal(format!(
                "group {} missing from bucket {}",
                key, previous
            ))
        };

        // synthetic frames are inserted into the map A lives in
        let before = self
            .frames
            .get(&previous)
            .and_then(|f| f.record(key))
            .map(|r| r.value.clone())
            .ok_or_else(missing)?;
        let after = &frame.record(key).ok_or_else(missing)?.value;

        let entry_bytes = plan.value_schema.record_size() + key.memory_size();
        let mut start = gap_start;
        while start < gap_end {
            let end = plan.sampler.next_boundary(start);
            if end <= start {
                break;
            }

            let mut synthetic = GroupRecord::new(plan.value_schema.new_record());
            for aggregate in &plan.aggregates {
                aggregate.reset(&mut synthetic.value);
                aggregate.interpolate_gap(&mut synthetic.value, &before, after, end - start);
            }

            if !ctx.allocate_memory(entry_bytes) {
                return Err(QueryError::resource_limit(format!(
                    "Memory limit exceeded interpolating bucket {} for group {}",
                    start, key
                )));
            }
            self.frames
                .entry(start)
                .or_default()
                .push(key.clone(), synthetic);
            stats.synthetic_rows += 1;
            start = end;
        }

        let closing = self
            .frames
            .get_mut(&previous)
            .and_then(|f| f.record_mut(key))
            .ok_or_else(missing)?;
        let opening = frame.record_mut(key).ok_or_else(missing)?;
        for aggregate in &plan.aggregates {
            aggregate.interpolate_boundary(
                &mut closing.value,
                &mut opening.value,
                gap_start,
                BoundarySide::Closing,
            );
            aggregate.interpolate_boundary(
                &mut closing.value,
                &mut opening.value,
                gap_end,
                BoundarySide::Opening,
            );
        }
        stats.boundary_apportionments += 2;

        trace!(group = %key, from = gap_start, to = gap_end, "Gap interpolated");
        Ok(())
    }

    /// Remove frames no future gap can reach
    fn take_settled(&mut self) -> Vec<(Timestamp, BucketFrame)> {
        let Some(watermark) = self.last_seen.values().min().copied() else {
            return Vec::new();
        };

        let mut settled = Vec::new();
        while self
            .frames
            .first_key_value()
            .is_some_and(|(start, _)| *start < watermark)
        {
            if let Some(frame) = self.frames.pop_first() {
                settled.push(frame);
            }
        }
        settled
    }

    /// Remove every frame
    fn take_all(&mut self) -> Vec<(Timestamp, BucketFrame)> {
        std::mem::take(&mut self.frames).into_iter().collect()
    }

    fn clear(&mut self) {
        self.frames.clear();
        self.last_seen.clear();
    }
}

// ============================================================================
// SAMPLE BY Operator
// ============================================================================

/// Time-bucketed aggregation over an ordered input
pub struct SampleByOperator {
    /// Input operator
    input: Box<dyn Operator>,

    /// Resolved plan
    plan: SampleByPlan,

    /// Groups of the current bucket
    table: Box<dyn GroupTable>,

    /// Copies grouping columns into keys
    keys: KeySink,

    /// Lifecycle state
    state: EngineState,

    /// Batch being consumed; kept across a bucket flip
    pending: Option<RecordBatch>,

    /// Next row of `pending`
    cursor: usize,

    /// Bucket currently being filled
    bucket: Option<Bucket>,

    /// Whether the input returned end of stream
    input_exhausted: bool,

    /// Output batches not yet returned
    ready: VecDeque<RecordBatch>,

    /// FILL(LINEAR) buffer
    linear: Option<LinearFill>,

    /// Bytes reserved from the context at construction
    reserved: usize,

    /// Rows per output batch
    batch_size: usize,

    /// Counters
    stats: EngineStats,
}

impl SampleByOperator {
    /// Build the engine
    ///
    /// Creates the group table and reserves its initial capacity from the
    /// context budget. Fails with `ConstructionFailure` if either step fails;
    /// the input and anything already built are dropped before returning.
    pub fn try_new(
        input: Box<dyn Operator>,
        plan: SampleByPlan,
        config: &ExecutorConfig,
        ctx: &mut ExecutionContext,
    ) -> Result<Self, QueryError> {
        let table = create_group_table(
            config.group_table,
            Arc::clone(&plan.value_schema),
            config.initial_group_capacity,
            config.max_groups,
        )
        .map_err(|e| QueryError::construction("failed to create group table").with_source(e))?;

        let reserved = config
            .initial_group_capacity
            .saturating_mul(plan.value_schema.record_size());
        if !ctx.allocate_memory(reserved) {
            return Err(QueryError::construction(format!(
                "cannot reserve {} bytes for {} groups",
                reserved, config.initial_group_capacity
            )));
        }

        let linear = (plan.fill == FillMode::Linear).then(LinearFill::default);
        let keys = KeySink::new(plan.key_schema.clone());

        debug!(
            input = input.name(),
            table = %config.group_table,
            reserved,
            fill = %plan.fill,
            "SAMPLE BY engine created"
        );

        Ok(Self {
            input,
            plan,
            table,
            keys,
            state: EngineState::ScanningBucket,
            pending: None,
            cursor: 0,
            bucket: None,
            input_exhausted: false,
            ready: VecDeque::new(),
            linear,
            reserved,
            batch_size: config.batch_size.max(1),
            stats: EngineStats::default(),
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Counters collected so far
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// The plan being executed
    pub fn plan(&self) -> &SampleByPlan {
        &self.plan
    }

    /// Pull and fold rows until the bucket flips or the input ends
    fn scan(&mut self, ctx: &mut ExecutionContext) -> Result<(), QueryError> {
        loop {
            if ctx.should_stop() {
                if ctx.is_timed_out() {
                    return Err(QueryError::timeout("SAMPLE BY operator timed out"));
                }
                if ctx.is_memory_exceeded() {
                    return Err(QueryError::resource_limit("Memory limit exceeded"));
                }
                return Err(QueryError::cancelled("SAMPLE BY cancelled"));
            }

            let batch = match self.pending.take() {
                Some(batch) => batch,
                None => match self.input.next_batch(ctx)? {
                    Some(batch) => {
                        self.cursor = 0;
                        batch
                    }
                    None => {
                        self.input_exhausted = true;
                        if self.bucket.is_some() {
                            self.state = EngineState::EmittingBucket;
                        } else {
                            debug!("SAMPLE BY input empty");
                            self.finish(ctx);
                        }
                        return Ok(());
                    }
                },
            };

            while self.cursor < batch.len() {
                let row = batch.row(self.cursor);
                let ts = row.get_timestamp(self.plan.timestamp_index);
                if ts == TIMESTAMP_NULL {
                    self.stats.rows_skipped += 1;
                    self.cursor += 1;
                    continue;
                }

                let start = self.plan.sampler.bucket_start(ts);
                match self.bucket {
                    None => {
                        self.bucket = Some(Bucket {
                            start,
                            end: self.plan.sampler.next_boundary(start),
                        });
                    }
                    Some(bucket) if start >= bucket.end => {
                        // row stays unconsumed for the next bucket
                        self.pending = Some(batch);
                        self.state = EngineState::EmittingBucket;
                        return Ok(());
                    }
                    Some(_) => {}
                }

                self.consume_row(&row, ctx)?;
                self.cursor += 1;
            }

            metrics::record_rows_consumed(batch.len());
            ctx.release_memory(batch.memory_size());
        }
    }

    /// Route a row to its group
    fn consume_row(&mut self, row: &RowRef<'_>, ctx: &mut ExecutionContext) -> Result<(), QueryError> {
        let key = self.keys.key(row);
        let entry_bytes = self.plan.value_schema.record_size() + key.memory_size();

        let (record, created) = self.table.find_or_create(key).map_err(|e| {
            QueryError::resource_limit("group table refused a new group").with_source(e)
        })?;

        if created {
            if !ctx.allocate_memory(entry_bytes) {
                return Err(QueryError::resource_limit(
                    "Memory limit exceeded creating group",
                ));
            }
            for aggregate in &self.plan.aggregates {
                aggregate.init(&mut record.value, row);
            }
            self.stats.groups_created += 1;
        } else {
            for aggregate in &self.plan.aggregates {
                aggregate.accumulate(&mut record.value, row);
            }
        }

        self.stats.rows_consumed += 1;
        Ok(())
    }

    /// Close the current bucket and queue whatever output it releases
    fn emit(&mut self, ctx: &mut ExecutionContext) -> Result<(), QueryError> {
        if let Some(bucket) = self.bucket.take() {
            let entries = self.table.drain();
            self.stats.buckets_closed += 1;
            trace!(bucket = bucket.start, groups = entries.len(), "Bucket closed");

            match self.linear.as_mut() {
                None => {
                    self.push_output(bucket.start, entries, ctx)?;
                }
                Some(linear) => {
                    linear.close_bucket(&self.plan, bucket, entries, ctx, &mut self.stats)?;
                    let settled = linear.take_settled();
                    for (start, frame) in settled {
                        self.push_output(start, frame.entries, ctx)?;
                    }
                }
            }
        }

        if self.input_exhausted {
            if let Some(linear) = self.linear.as_mut() {
                let remaining = linear.take_all();
                for (start, frame) in remaining {
                    self.push_output(start, frame.entries, ctx)?;
                }
            }
            self.finish(ctx);
        } else {
            self.state = EngineState::ScanningBucket;
        }
        Ok(())
    }

    /// Turn one bucket's groups into output rows
    fn push_output(
        &mut self,
        bucket: Timestamp,
        mut entries: Vec<(GroupKey, GroupRecord)>,
        ctx: &mut ExecutionContext,
    ) -> Result<(), QueryError> {
        if entries.is_empty() {
            return Ok(());
        }
        if self.table.is_ordered() {
            entries.sort_by(|a, b| a.0.cmp(&b.0));
        }

        let metadata = Arc::clone(&self.plan.output_metadata);
        let record_size = self.plan.value_schema.record_size();
        let rows = entries.len();
        let mut batch = RecordBatch::with_capacity(Arc::clone(&metadata), rows.min(self.batch_size));

        for (key, record) in entries {
            let entry_bytes = record_size + key.memory_size();
            let mut values: Vec<Value> = key.0.into_iter().map(Value::from).collect();
            values.extend(self.plan.aggregates.iter().map(|a| a.extract(&record.value)));
            values.push(Value::Timestamp(bucket));
            batch.push_row(values)?;
            ctx.release_memory(entry_bytes);

            if batch.len() >= self.batch_size {
                let full = std::mem::replace(
                    &mut batch,
                    RecordBatch::with_capacity(Arc::clone(&metadata), self.batch_size),
                );
                self.ready.push_back(full);
            }
        }
        if !batch.is_empty() {
            self.ready.push_back(batch);
        }

        self.stats.rows_emitted += rows as u64;
        metrics::record_bucket_emitted(self.plan.fill, rows);
        trace!(bucket, rows, "Bucket emitted");
        Ok(())
    }

    fn finish(&mut self, ctx: &mut ExecutionContext) {
        self.state = EngineState::Done;
        ctx.release_memory(self.reserved);
        self.reserved = 0;

        metrics::record_interpolation(
            self.stats.synthetic_rows,
            self.stats.boundary_apportionments,
        );
        debug!(
            rows_consumed = self.stats.rows_consumed,
            rows_emitted = self.stats.rows_emitted,
            buckets = self.stats.buckets_closed,
            synthetic = self.stats.synthetic_rows,
            "SAMPLE BY finished"
        );
    }

    fn fail(&mut self, error: QueryError) -> QueryError {
        self.state = EngineState::Failed;
        self.ready.clear();
        self.pending = None;
        self.table.clear();
        if let Some(linear) = self.linear.as_mut() {
            linear.clear();
        }
        debug!(error = %error, "SAMPLE BY failed");
        error
    }
}

impl Operator for SampleByOperator {
    fn next_batch(
        &mut self,
        ctx: &mut ExecutionContext,
    ) -> Result<Option<RecordBatch>, QueryError> {
        loop {
            if let Some(batch) = self.ready.pop_front() {
                ctx.record_rows(batch.len());
                return Ok(Some(batch));
            }

            let step = match self.state {
                EngineState::Done => return Ok(None),
                EngineState::Failed => {
                    return Err(QueryError::execution("SAMPLE BY operator has failed"))
                }
                EngineState::ScanningBucket => self.scan(ctx),
                EngineState::EmittingBucket => self.emit(ctx),
            };
            if let Err(e) = step {
                return Err(self.fail(e));
            }
        }
    }

    fn reset(&mut self) {
        self.input.reset();
        self.table.clear();
        if let Some(linear) = self.linear.as_mut() {
            linear.clear();
        }
        self.state = EngineState::ScanningBucket;
        self.pending = None;
        self.cursor = 0;
        self.bucket = None;
        self.input_exhausted = false;
        self.ready.clear();
        self.stats = EngineStats::default();
    }

    fn name(&self) -> &'static str {
        "SampleBy"
    }

    fn metadata(&self) -> Arc<RecordMetadata> {
        Arc::clone(&self.plan.output_metadata)
    }

    fn estimated_cardinality(&self) -> usize {
        self.input.estimated_cardinality()
    }
}

impl fmt::Debug for SampleByOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleByOperator")
            .field("input", &self.input.name())
            .field("state", &self.state)
            .field("fill", &self.plan.fill)
            .field("groups", &self.table.len())
            .field("stats", &self.stats)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::functions::haversine_distance_deg;
    use crate::aggregation::group_table::GroupTableKind;
    use crate::query::ast::{AggregateSpec, FillStrategy, SampleByQuery};
    use crate::query::error::QueryErrorKind;
    use crate::query::operators::ScanOperator;
    use crate::query::planner::SampleByPlanner;
    use crate::types::{ColumnType, MICROS_PER_HOUR, MICROS_PER_MINUTE};

    fn input_metadata() -> Arc<RecordMetadata> {
        Arc::new(
            RecordMetadata::builder()
                .column("s", ColumnType::Symbol)
                .column("lat", ColumnType::Double)
                .column("lon", ColumnType::Double)
                .timestamp("k")
                .build(),
        )
    }

    fn row(s: &str, lat: f64, lon: f64, ts: i64) -> Vec<Value> {
        vec![
            Value::Symbol(Some(s.to_string())),
            Value::Double(lat),
            Value::Double(lon),
            Value::Timestamp(ts),
        ]
    }

    fn build(
        rows: Vec<Vec<Value>>,
        fill: FillStrategy,
        keys: &[&str],
        config: &ExecutorConfig,
        ctx: &mut ExecutionContext,
    ) -> SampleByOperator {
        let mut builder = SampleByQuery::builder()
            .aggregate(AggregateSpec::parse("haversine_dist_deg(lat, lon, k)").unwrap())
            .interval_str("1h")
            .unwrap()
            .fill(fill);
        for key in keys {
            builder = builder.key(*key);
        }
        let query = builder.build().unwrap();
        let source = ScanOperator::from_rows(input_metadata(), rows)
            .unwrap()
            .with_batch_size(3);
        let plan = SampleByPlanner::new()
            .plan(&query, source.metadata())
            .unwrap();
        SampleByOperator::try_new(Box::new(source), plan, config, ctx).unwrap()
    }

    fn drain(op: &mut SampleByOperator, ctx: &mut ExecutionContext) -> Vec<Vec<Value>> {
        let mut rows = Vec::new();
        while let Some(batch) = op.next_batch(ctx).unwrap() {
            for i in 0..batch.len() {
                rows.push(batch.row_values(i));
            }
        }
        rows
    }

    fn as_f64(value: &Value) -> f64 {
        value.as_f64().unwrap_or(f64::NAN)
    }

    #[test]
    fn test_fill_none_buckets() {
        let config = ExecutorConfig::default();
        let mut ctx = ExecutionContext::new(&config);
        let step = 20 * MICROS_PER_MINUTE;
        // hour 0: 3 rows, hour 1: none, hour 2: 2 rows
        let rows = vec![
            row("a", 0.0, 0.0, 0),
            row("a", 0.0, 1.0, step),
            row("a", 0.0, 2.0, 2 * step),
            row("a", 0.0, 3.0, 2 * MICROS_PER_HOUR),
            row("a", 0.0, 4.0, 2 * MICROS_PER_HOUR + step),
        ];
        let mut op = build(rows, FillStrategy::None, &["s"], &config, &mut ctx);
        let out = drain(&mut op, &mut ctx);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0][2], Value::Timestamp(0));
        assert_eq!(out[1][2], Value::Timestamp(2 * MICROS_PER_HOUR));
        let expected = 2.0 * haversine_distance_deg(0.0, 0.0, 0.0, 1.0);
        assert!((as_f64(&out[0][1]) - expected).abs() < 1e-9);
        assert_eq!(op.state(), EngineState::Done);
        assert_eq!(op.stats().rows_consumed, 5);
        assert_eq!(op.stats().buckets_closed, 2);
        assert_eq!(ctx.memory_used, 0);
    }

    #[test]
    fn test_empty_input_goes_straight_to_done() {
        let config = ExecutorConfig::default();
        let mut ctx = ExecutionContext::new(&config);
        let mut op = build(Vec::new(), FillStrategy::Linear, &["s"], &config, &mut ctx);
        assert!(op.next_batch(&mut ctx).unwrap().is_none());
        assert_eq!(op.state(), EngineState::Done);
        assert_eq!(op.stats().groups_created, 0);
    }

    #[test]
    fn test_linear_single_gap() {
        let config = ExecutorConfig::default().with_group_table(GroupTableKind::Ordered);
        let mut ctx = ExecutionContext::new(&config);
        let half = 30 * MICROS_PER_MINUTE;
        // hour 0: two points, hour 1: nothing, hour 2: two points
        let rows = vec![
            row("a", 0.0, 0.0, 0),
            row("a", 0.0, 1.0, half),
            row("a", 0.0, 3.0, 2 * MICROS_PER_HOUR + half),
            row("a", 0.0, 4.0, 3 * MICROS_PER_HOUR - 1),
        ];
        let mut op = build(rows, FillStrategy::Linear, &["s"], &config, &mut ctx);
        let out = drain(&mut op, &mut ctx);

        assert_eq!(out.len(), 3);
        let stamps: Vec<_> = out.iter().map(|r| r[2].clone()).collect();
        assert_eq!(
            stamps,
            vec![
                Value::Timestamp(0),
                Value::Timestamp(MICROS_PER_HOUR),
                Value::Timestamp(2 * MICROS_PER_HOUR)
            ]
        );

        // interval straddling the gap: lon 1 -> 3 over two hours
        let span = haversine_distance_deg(0.0, 1.0, 0.0, 3.0);
        let gap = span * (MICROS_PER_HOUR as f64) / (2.0 * MICROS_PER_HOUR as f64);
        assert!((as_f64(&out[1][1]) - gap).abs() < 1e-9);

        let first = haversine_distance_deg(0.0, 0.0, 0.0, 1.0) + span / 4.0;
        assert!((as_f64(&out[0][1]) - first).abs() < 1e-9);

        let last = haversine_distance_deg(0.0, 3.0, 0.0, 4.0) + span / 4.0;
        assert!((as_f64(&out[2][1]) - last).abs() < 1e-9);

        let total: f64 = out.iter().map(|r| as_f64(&r[1])).sum();
        let direct = haversine_distance_deg(0.0, 0.0, 0.0, 1.0)
            + span
            + haversine_distance_deg(0.0, 3.0, 0.0, 4.0);
        assert!((total - direct).abs() < 1e-9);
        assert_eq!(op.stats().synthetic_rows, 1);
        assert_eq!(op.stats().boundary_apportionments, 2);
    }

    #[test]
    fn test_linear_adjacent_buckets_not_apportioned() {
        let config = ExecutorConfig::default();
        let mut ctx = ExecutionContext::new(&config);
        let rows = vec![
            row("a", 0.0, 0.0, 0),
            row("a", 0.0, 1.0, MICROS_PER_HOUR - 1),
            row("a", 0.0, 2.0, MICROS_PER_HOUR),
        ];
        let mut op = build(rows, FillStrategy::Linear, &[], &config, &mut ctx);
        let out = drain(&mut op, &mut ctx);

        assert_eq!(out.len(), 2);
        assert!((as_f64(&out[0][0]) - haversine_distance_deg(0.0, 0.0, 0.0, 1.0)).abs() < 1e-9);
        assert_eq!(as_f64(&out[1][0]), 0.0);
        assert_eq!(op.stats().synthetic_rows, 0);
    }

    #[test]
    fn test_linear_no_fill_outside_group_lifetime() {
        let config = ExecutorConfig::default().with_group_table(GroupTableKind::Ordered);
        let mut ctx = ExecutionContext::new(&config);
        // group b only lives in hour 3, group a spans hours 0..3
        let rows = vec![
            row("a", 0.0, 0.0, 0),
            row("a", 0.0, 1.0, 3 * MICROS_PER_HOUR),
            row("b", 1.0, 1.0, 3 * MICROS_PER_HOUR + 1),
        ];
        let mut op = build(rows, FillStrategy::Linear, &["s"], &config, &mut ctx);
        let out = drain(&mut op, &mut ctx);

        let b_rows: Vec<_> = out
            .iter()
            .filter(|r| r[0] == Value::Symbol(Some("b".into())))
            .collect();
        assert_eq!(b_rows.len(), 1);
        let a_rows = out.len() - b_rows.len();
        assert_eq!(a_rows, 4);
        // output stays in bucket order
        let stamps: Vec<i64> = out.iter().filter_map(|r| r[2].as_f64()).map(|t| t as i64).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_group_limit_fails_engine() {
        let config = ExecutorConfig::default().with_initial_group_capacity(1).with_max_groups(1);
        let mut ctx = ExecutionContext::new(&config);
        let rows = vec![row("a", 0.0, 0.0, 0), row("b", 0.0, 0.0, 1)];
        let mut op = build(rows, FillStrategy::None, &["s"], &config, &mut ctx);

        let err = op.next_batch(&mut ctx).unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::ResourceLimit);
        assert_eq!(op.state(), EngineState::Failed);
        let again = op.next_batch(&mut ctx).unwrap_err();
        assert_eq!(again.kind, QueryErrorKind::ExecutionError);
    }

    #[test]
    fn test_construction_failure_on_reservation() {
        let config = ExecutorConfig::default()
            .with_memory_limit(16)
            .with_initial_group_capacity(10);
        let mut ctx = ExecutionContext::new(&config);
        let query = SampleByQuery::builder()
            .aggregate(AggregateSpec::parse("haversine_dist_deg(lat, lon, k)").unwrap())
            .interval_str("1h")
            .unwrap()
            .build()
            .unwrap();
        let source = ScanOperator::from_rows(input_metadata(), Vec::new()).unwrap();
        let plan = SampleByPlanner::new().plan(&query, source.metadata()).unwrap();

        let err = SampleByOperator::try_new(Box::new(source), plan, &config, &mut ctx).unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::ConstructionFailure);
        assert_eq!(ctx.memory_used, 0);
    }

    #[test]
    fn test_reset_replays() {
        let config = ExecutorConfig::default();
        let mut ctx = ExecutionContext::new(&config);
        let rows = vec![row("a", 0.0, 0.0, 0), row("a", 0.0, 1.0, 1)];
        let mut op = build(rows, FillStrategy::None, &["s"], &config, &mut ctx);
        let first = drain(&mut op, &mut ctx);
        op.reset();
        let second = drain(&mut op, &mut ctx);
        assert_eq!(first, second);
    }
}
