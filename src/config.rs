//! Configuration management for the SAMPLE BY engine
//!
//! This module provides configuration file support with TOML format,
//! environment variable overrides, and sensible defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::aggregation::group_table::GroupTableKind;
use crate::error::{Error, Result, ValidationError};
use crate::query::executor::ExecutorConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Group table and batching
    #[serde(default)]
    pub engine: EngineConfig,

    /// Per-query limits
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Monitoring and observability
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Group table implementation
    #[serde(default)]
    pub group_table: GroupTableKind,

    /// Groups reserved when the engine is built
    #[serde(default = "default_initial_group_capacity")]
    pub initial_group_capacity: usize,

    /// Maximum groups per bucket
    #[serde(default = "default_max_groups")]
    pub max_groups: usize,

    /// Rows per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Execution limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Memory budget per query in megabytes
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: usize,

    /// Query timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum rows returned per query
    #[serde(default = "default_max_result_rows")]
    pub max_result_rows: usize,
}

/// Monitoring configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions
fn default_initial_group_capacity() -> usize { 64 }
fn default_max_groups() -> usize { 1_000_000 }
fn default_batch_size() -> usize { 4096 }
fn default_memory_limit_mb() -> usize { 256 }
fn default_timeout_ms() -> u64 { 30_000 }
fn default_max_result_rows() -> usize { 1_000_000 }
fn default_log_level() -> String { "info".to_string() }
fn default_true() -> bool { true }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            group_table: GroupTableKind::default(),
            initial_group_capacity: default_initial_group_capacity(),
            max_groups: default_max_groups(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            memory_limit_mb: default_memory_limit_mb(),
            timeout_ms: default_timeout_ms(),
            max_result_rows: default_max_result_rows(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("Failed to parse config file {}: {}", path, e))
        })
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: &str) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    ///
    /// Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        // Engine
        if let Some(kind) = env_parse("SAMPLEBY_GROUP_TABLE") {
            self.engine.group_table = kind;
        }
        if let Some(n) = env_parse("SAMPLEBY_INITIAL_GROUP_CAPACITY") {
            self.engine.initial_group_capacity = n;
        }
        if let Some(n) = env_parse("SAMPLEBY_MAX_GROUPS") {
            self.engine.max_groups = n;
        }
        if let Some(n) = env_parse("SAMPLEBY_BATCH_SIZE") {
            self.engine.batch_size = n;
        }

        // Execution
        if let Some(n) = env_parse("SAMPLEBY_MEMORY_LIMIT_MB") {
            self.execution.memory_limit_mb = n;
        }
        if let Some(n) = env_parse("SAMPLEBY_TIMEOUT_MS") {
            self.execution.timeout_ms = n;
        }
        if let Some(n) = env_parse("SAMPLEBY_MAX_RESULT_ROWS") {
            self.execution.max_result_rows = n;
        }

        // Monitoring
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.monitoring.log_level = log_level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.engine.batch_size == 0 {
            return Err(out_of_range("engine.batch_size", 0, 1, usize::MAX));
        }
        if self.engine.max_groups == 0 {
            return Err(out_of_range("engine.max_groups", 0, 1, usize::MAX));
        }
        if self.engine.initial_group_capacity > self.engine.max_groups {
            return Err(out_of_range(
                "engine.initial_group_capacity",
                self.engine.initial_group_capacity,
                0,
                self.engine.max_groups,
            ));
        }
        if self.execution.memory_limit_mb == 0 {
            return Err(out_of_range("execution.memory_limit_mb", 0, 1, usize::MAX));
        }
        if self.execution.timeout_ms == 0 {
            return Err(out_of_range("execution.timeout_ms", 0, 1, u64::MAX));
        }
        if self.execution.max_result_rows == 0 {
            return Err(out_of_range("execution.max_result_rows", 0, 1, usize::MAX));
        }
        if self.monitoring.log_level.trim().is_empty() {
            return Err(ValidationError::MissingField("monitoring.log_level".into()));
        }

        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Executor settings derived from this configuration
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig::default()
            .with_batch_size(self.engine.batch_size)
            .with_group_table(self.engine.group_table)
            .with_initial_group_capacity(self.engine.initial_group_capacity)
            .with_max_groups(self.engine.max_groups)
            .with_memory_limit(self.execution.memory_limit_mb.saturating_mul(1024 * 1024))
            .with_timeout(Duration::from_millis(self.execution.timeout_ms))
            .with_max_result_rows(self.execution.max_result_rows)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn out_of_range(
    field: &str,
    value: impl ToString,
    min: impl ToString,
    max: impl ToString,
) -> ValidationError {
    ValidationError::OutOfRange {
        field: field.to_string(),
        value: value.to_string(),
        min: min.to_string(),
        max: max.to_string(),
    }
}
