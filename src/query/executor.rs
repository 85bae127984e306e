//! Query Executor - batch pull execution
//!
//! This module provides the execution infrastructure for SAMPLE BY queries:
//! - Executor configuration (batch size, memory budget, timeout, group limits)
//! - Execution context threaded through every operator
//! - The drain loop that collects an operator tree into a [`QueryResult`]
//!
//! # Architecture
//!
//! The executor follows a pull-based volcano model:
//!
//! ```text
//! ┌─────────────────┐
//! │  Result Sink    │  ← Final results collected here
//! └────────┬────────┘
//!          │ pull batches
//! ┌────────▼────────┐
//! │   SAMPLE BY     │  ← bucket, group, interpolate
//! └────────┬────────┘
//!          │ pull batches
//! ┌────────▼────────┐
//! │     Source      │  ← rows in designated timestamp order
//! └─────────────────┘
//! ```

use crate::aggregation::group_table::GroupTableKind;
use crate::metrics;
use crate::query::ast::SampleByQuery;
use crate::query::error::QueryError;
use crate::query::operators::{Operator, SampleByOperator};
use crate::query::planner::SampleByPlanner;
use crate::query::result::{QueryResult, ResultRow};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

// ============================================================================
// Executor Configuration
// ============================================================================

/// Configuration for query execution
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Rows per batch pulled from sources (default: 4096)
    pub batch_size: usize,

    /// Maximum memory budget for query execution in bytes (default: 256MB)
    pub memory_limit: usize,

    /// Query timeout duration (default: 30 seconds)
    pub timeout: Duration,

    /// Maximum number of rows in result (default: 1_000_000)
    pub max_result_rows: usize,

    /// Group table implementation (default: hash)
    pub group_table: GroupTableKind,

    /// Groups reserved when the engine is built (default: 64)
    pub initial_group_capacity: usize,

    /// Maximum distinct groups per bucket (default: 1_000_000)
    pub max_groups: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            batch_size: 4096,
            memory_limit: 256 * 1024 * 1024, // 256 MB
            timeout: Duration::from_secs(30),
            max_result_rows: 1_000_000,
            group_table: GroupTableKind::Hash,
            initial_group_capacity: 64,
            max_groups: 1_000_000,
        }
    }
}

impl ExecutorConfig {
    /// Create a new executor config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set batch size
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set memory limit in bytes
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = bytes;
        self
    }

    /// Set query timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set maximum result rows
    pub fn with_max_result_rows(mut self, rows: usize) -> Self {
        self.max_result_rows = rows;
        self
    }

    /// Select the group table implementation
    pub fn with_group_table(mut self, kind: GroupTableKind) -> Self {
        self.group_table = kind;
        self
    }

    /// Set groups reserved up front
    pub fn with_initial_group_capacity(mut self, groups: usize) -> Self {
        self.initial_group_capacity = groups;
        self
    }

    /// Set the distinct group limit
    pub fn with_max_groups(mut self, groups: usize) -> Self {
        self.max_groups = groups;
        self
    }
}

// ============================================================================
// Query Executor
// ============================================================================

/// Main query executor that orchestrates query processing
///
/// The executor is responsible for:
/// 1. Planning a SAMPLE BY query against its source
/// 2. Building the engine inside a fresh execution context
/// 3. Draining the operator tree into a result
/// 4. Collecting statistics
pub struct QueryExecutor {
    /// Executor configuration
    config: ExecutorConfig,

    /// Execution statistics for monitoring
    stats: ExecutionStats,
}

impl QueryExecutor {
    /// Create a new query executor with default configuration
    pub fn new() -> Self {
        Self::with_config(ExecutorConfig::default())
    }

    /// Create a query executor with custom configuration
    pub fn with_config(config: ExecutorConfig) -> Self {
        Self {
            config,
            stats: ExecutionStats::default(),
        }
    }

    /// Plan and run a SAMPLE BY query over `source`
    ///
    /// # Example
    ///
    /// ```rust
    /// use kuba_sampleby::query::ast::{AggregateSpec, SampleByQuery};
    /// use kuba_sampleby::query::executor::QueryExecutor;
    /// use kuba_sampleby::query::operators::ScanOperator;
    /// use kuba_sampleby::types::{ColumnType, RecordMetadata, Value};
    /// use std::sync::Arc;
    ///
    /// let metadata = Arc::new(
    ///     RecordMetadata::builder()
    ///         .column("x", ColumnType::Double)
    ///         .timestamp("k")
    ///         .build(),
    /// );
    /// let source = ScanOperator::from_rows(
    ///     metadata,
    ///     vec![
    ///         vec![Value::Double(1.0), Value::Timestamp(0)],
    ///         vec![Value::Double(2.0), Value::Timestamp(10)],
    ///     ],
    /// )
    /// .unwrap();
    ///
    /// let query = SampleByQuery::builder()
    ///     .aggregate(AggregateSpec::parse("sum(x)").unwrap())
    ///     .interval_str("1s")
    ///     .unwrap()
    ///     .build()
    ///     .unwrap();
    ///
    /// let mut executor = QueryExecutor::new();
    /// let result = executor.execute_sample_by(&query, Box::new(source)).unwrap();
    /// assert_eq!(result.row_count(), 1);
    /// ```
    pub fn execute_sample_by(
        &mut self,
        query: &SampleByQuery,
        source: Box<dyn Operator>,
    ) -> Result<QueryResult, QueryError> {
        let start = Instant::now();

        // Use is_zero() to catch sub-second timeouts like Duration::from_nanos(1)
        if self.config.timeout.is_zero() {
            return Err(QueryError::timeout("Query timeout is zero"));
        }

        let mut ctx = ExecutionContext::new(&self.config);
        let result = SampleByPlanner::new()
            .plan(query, source.metadata())
            .and_then(|plan| SampleByOperator::try_new(source, plan, &self.config, &mut ctx))
            .and_then(|operator| self.execute_operator(Box::new(operator), &mut ctx));

        // Record execution time
        let duration = start.elapsed();
        self.stats.total_queries += 1;
        self.stats.total_execution_time += duration;

        match result {
            Ok(result) => {
                debug!(
                    query = %query,
                    rows = result.row_count(),
                    elapsed_us = duration.as_micros() as u64,
                    "SAMPLE BY completed"
                );
                Ok(result.with_execution_time(duration))
            }
            Err(e) => {
                self.stats.failed_queries += 1;
                metrics::record_failure(e.kind);
                warn!(query = %query, error = %e, "SAMPLE BY failed");
                Err(e)
            }
        }
    }

    /// Get current execution statistics
    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    /// Reset execution statistics
    pub fn reset_stats(&mut self) {
        self.stats = ExecutionStats::default();
    }

    /// Get executor configuration
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute an operator tree and collect results
    ///
    /// This is the core execution loop that pulls batches from operators
    /// and collects them into a QueryResult. It handles:
    /// - Memory tracking and limits
    /// - Timeout checking
    /// - Row limit enforcement
    /// - Statistics collection
    ///
    /// # Arguments
    ///
    /// * `operator` - Root of the operator tree to execute
    /// * `ctx` - Execution context with limits and state
    ///
    /// # Returns
    ///
    /// * `Ok(QueryResult)` - Results with metadata
    /// * `Err(QueryError)` - If execution fails or limits exceeded
    pub fn execute_operator(
        &mut self,
        mut operator: Box<dyn Operator>,
        ctx: &mut ExecutionContext,
    ) -> Result<QueryResult, QueryError> {
        let columns = operator.metadata().columns().to_vec();
        let mut rows = Vec::new();
        let mut rows_scanned = 0u64;
        let mut was_truncated = false;

        // Pull batches from operator tree until exhausted or limit reached
        while let Some(batch) = operator.next_batch(ctx)? {
            // Track statistics
            rows_scanned += batch.len() as u64;
            self.stats.rows_scanned += batch.len() as u64;

            // Convert batch to result rows
            for i in 0..batch.len() {
                // Check row limit
                if rows.len() >= self.config.max_result_rows {
                    was_truncated = true;
                    break;
                }

                rows.push(ResultRow::new(batch.row_values(i)));
            }

            // Check if we've hit the row limit
            if rows.len() >= self.config.max_result_rows {
                was_truncated = true;
                break;
            }

            // Check for timeout
            if ctx.is_timed_out() {
                return Err(QueryError::timeout("Query execution timed out"));
            }

            // Check memory limit
            if ctx.is_memory_exceeded() {
                return Err(QueryError::resource_limit("Memory limit exceeded"));
            }
        }

        // Update statistics
        self.stats.rows_returned += rows.len() as u64;

        // Build result with metadata
        let mut result = QueryResult::new(columns, rows).with_rows_scanned(rows_scanned);

        if was_truncated {
            result.metadata.truncated = true;
            result.metadata.add_warning(format!(
                "Results truncated to {} rows",
                self.config.max_result_rows
            ));
        }

        Ok(result)
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Execution Statistics
// ============================================================================

/// Statistics collected during query execution for monitoring
#[derive(Debug, Clone, Default)]
pub struct ExecutionStats {
    /// Total number of queries executed
    pub total_queries: u64,

    /// Queries that ended in an error
    pub failed_queries: u64,

    /// Total execution time across all queries
    pub total_execution_time: Duration,

    /// Total rows pulled from root operators
    pub rows_scanned: u64,

    /// Total rows returned
    pub rows_returned: u64,
}

impl ExecutionStats {
    /// Calculate average query latency
    pub fn avg_query_latency(&self) -> Duration {
        if self.total_queries == 0 {
            Duration::ZERO
        } else {
            // Cap at u32::MAX to prevent truncation after 4 billion queries
            self.total_execution_time / self.total_queries.min(u32::MAX as u64) as u32
        }
    }

    /// Fraction of queries that failed (0.0 to 1.0)
    pub fn failure_ratio(&self) -> f64 {
        if self.total_queries == 0 {
            0.0
        } else {
            self.failed_queries as f64 / self.total_queries as f64
        }
    }
}

// ============================================================================
// Execution Context
// ============================================================================

/// Context passed through the execution pipeline
///
/// Contains shared state and resources needed by operators during execution
#[derive(Debug)]
pub struct ExecutionContext {
    /// Query start time for timeout checking
    pub start_time: Instant,

    /// Timeout duration
    pub timeout: Duration,

    /// Current memory usage in bytes
    pub memory_used: usize,

    /// Memory limit in bytes
    pub memory_limit: usize,

    /// Rows produced so far
    pub rows_produced: usize,

    /// Maximum rows allowed
    pub max_rows: usize,

    /// Whether execution has been cancelled
    pub cancelled: bool,
}

impl ExecutionContext {
    /// Create a new execution context from config
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            start_time: Instant::now(),
            timeout: config.timeout,
            memory_used: 0,
            memory_limit: config.memory_limit,
            rows_produced: 0,
            max_rows: config.max_result_rows,
            cancelled: false,
        }
    }

    /// Check if query has timed out
    pub fn is_timed_out(&self) -> bool {
        self.start_time.elapsed() > self.timeout
    }

    /// Check if memory limit exceeded
    pub fn is_memory_exceeded(&self) -> bool {
        self.memory_used > self.memory_limit
    }

    /// Check if row limit exceeded
    pub fn is_row_limit_exceeded(&self) -> bool {
        self.rows_produced >= self.max_rows
    }

    /// Check if execution should stop (timeout, cancelled, or limits exceeded)
    pub fn should_stop(&self) -> bool {
        self.cancelled || self.is_timed_out() || self.is_memory_exceeded()
    }

    /// Allocate memory from the budget
    ///
    /// Returns true if allocation succeeded, false if would exceed limit
    pub fn allocate_memory(&mut self, bytes: usize) -> bool {
        match self.memory_used.checked_add(bytes) {
            Some(total) if total <= self.memory_limit => {
                self.memory_used = total;
                true
            }
            _ => false,
        }
    }

    /// Release memory back to the budget
    pub fn release_memory(&mut self, bytes: usize) {
        self.memory_used = self.memory_used.saturating_sub(bytes);
    }

    /// Record rows produced
    pub fn record_rows(&mut self, count: usize) {
        self.rows_produced += count;
    }

    /// Cancel execution
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Get remaining time before timeout
    pub fn remaining_time(&self) -> Duration {
        self.timeout.saturating_sub(self.start_time.elapsed())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_config_defaults() {
        let config = ExecutorConfig::default();
        assert_eq!(config.batch_size, 4096);
        assert_eq!(config.memory_limit, 256 * 1024 * 1024);
        assert_eq!(config.group_table, GroupTableKind::Hash);
        assert!(config.initial_group_capacity <= config.max_groups);
    }

    #[test]
    fn test_executor_config_builder() {
        let config = ExecutorConfig::new()
            .with_batch_size(0)
            .with_timeout(Duration::from_secs(60))
            .with_group_table(GroupTableKind::Ordered)
            .with_initial_group_capacity(8)
            .with_max_groups(100);

        assert_eq!(config.batch_size, 1);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.group_table, GroupTableKind::Ordered);
        assert_eq!(config.initial_group_capacity, 8);
        assert_eq!(config.max_groups, 100);
    }

    #[test]
    fn test_execution_stats() {
        let stats = ExecutionStats {
            total_queries: 4,
            failed_queries: 1,
            total_execution_time: Duration::from_millis(40),
            ..Default::default()
        };

        assert!((stats.failure_ratio() - 0.25).abs() < 0.001);
        assert_eq!(stats.avg_query_latency(), Duration::from_millis(10));
        assert_eq!(ExecutionStats::default().failure_ratio(), 0.0);
    }

    #[test]
    fn test_execution_context() {
        let config = ExecutorConfig::new().with_memory_limit(1000);
        let mut ctx = ExecutionContext::new(&config);

        // Test memory allocation
        assert!(ctx.allocate_memory(500));
        assert_eq!(ctx.memory_used, 500);
        assert!(ctx.allocate_memory(400));
        assert_eq!(ctx.memory_used, 900);
        assert!(!ctx.allocate_memory(200)); // Would exceed limit
        assert_eq!(ctx.memory_used, 900);
        assert!(!ctx.allocate_memory(usize::MAX));

        // Test memory release
        ctx.release_memory(300);
        assert_eq!(ctx.memory_used, 600);
    }

    #[test]
    fn test_execution_context_cancellation() {
        let config = ExecutorConfig::default();
        let mut ctx = ExecutionContext::new(&config);

        assert!(!ctx.should_stop());
        ctx.cancel();
        assert!(ctx.should_stop());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        use crate::query::ast::AggregateSpec;
        use crate::query::error::QueryErrorKind;
        use crate::query::operators::ScanOperator;
        use crate::types::RecordMetadata;
        use std::sync::Arc;

        let metadata = Arc::new(RecordMetadata::builder().timestamp("k").build());
        let source = ScanOperator::from_rows(metadata, Vec::new()).unwrap();
        let query = SampleByQuery::builder()
            .aggregate(AggregateSpec::Count)
            .interval_str("1s")
            .unwrap()
            .build()
            .unwrap();

        let mut executor =
            QueryExecutor::with_config(ExecutorConfig::new().with_timeout(Duration::ZERO));
        let err = executor
            .execute_sample_by(&query, Box::new(source))
            .unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::Timeout);
    }

    #[test]
    fn test_executor_creation() {
        let executor = QueryExecutor::new();
        assert_eq!(executor.stats().total_queries, 0);
    }
}
