//! SAMPLE BY command line runner
//!
//! Reads rows as JSON lines, runs a SAMPLE BY over them and prints the
//! result. Rows must arrive in designated timestamp order.
//!
//! # Example Usage
//!
//! ```bash
//! # Distance travelled per hour and symbol, interpolating empty hours
//! sampleby run \
//!   --schema "s:symbol,lat:double,lon:double,k:timestamp" \
//!   --timestamp k \
//!   --keys s \
//!   --aggregates "count(), haversine_dist_deg(lat, lon, k)" \
//!   --interval 1h \
//!   --fill linear \
//!   --input trips.jsonl
//!
//! # Validate a configuration file
//! sampleby --config sampleby.toml check-config
//! ```
//!
//! Timestamps are microseconds since the epoch or RFC 3339 strings. Missing
//! fields and JSON `null` become null cells.

use std::error::Error as StdError;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{debug, info};

use kuba_sampleby::config::Config;
use kuba_sampleby::metrics;
use kuba_sampleby::query::{
    AggregateSpec, FillStrategy, QueryExecutor, ResultFormat, SampleByQuery, ScanOperator,
};
use kuba_sampleby::types::{ColumnType, RecordMetadata, Value, LONG_NULL, TIMESTAMP_NULL};
use kuba_sampleby::Error;

// =============================================================================
// CLI Definition
// =============================================================================

/// Time-bucketed aggregation over JSON-lines rows
#[derive(Parser)]
#[command(name = "sampleby")]
#[command(version)]
#[command(about = "Run SAMPLE BY aggregations with FILL(NONE) or FILL(LINEAR)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (overrides SAMPLEBY_CONFIG env var)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a SAMPLE BY query
    Run(RunArgs),

    /// Validate configuration file and print it
    CheckConfig,

    /// Print registered Prometheus metrics
    Metrics,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Input columns as `name:type` pairs (double, long, timestamp, symbol)
    #[arg(short, long)]
    schema: String,

    /// Designated timestamp column
    #[arg(short, long)]
    timestamp: String,

    /// Sampling interval, e.g. `15m`, `1h`, `1M`
    #[arg(short, long)]
    interval: String,

    /// Aggregates, e.g. `count(), haversine_dist_deg(lat, lon, k)`
    #[arg(short, long, default_value = "count()")]
    aggregates: String,

    /// Comma separated grouping columns
    #[arg(short, long)]
    keys: Option<String>,

    /// Fill mode (none, linear)
    #[arg(short, long, default_value = "none")]
    fill: String,

    /// Input file, stdin when omitted
    #[arg(long)]
    input: Option<PathBuf>,

    /// Output format (json, json-pretty, jsonl, csv, table)
    #[arg(long, default_value = "jsonl")]
    format: String,
}

// =============================================================================
// Input Decoding
// =============================================================================

fn parse_schema(schema: &str, timestamp: &str) -> Result<RecordMetadata, Error> {
    let mut builder = RecordMetadata::builder();
    let mut found_timestamp = false;

    for entry in schema.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, column_type) = entry
            .split_once(':')
            .ok_or_else(|| Error::General(format!("expected name:type, got '{}'", entry)))?;
        let name = name.trim();
        let column_type: ColumnType = column_type.parse().map_err(Error::General)?;

        if name == timestamp {
            if column_type != ColumnType::Timestamp {
                return Err(Error::General(format!(
                    "designated timestamp '{}' must be of type timestamp",
                    name
                )));
            }
            builder = builder.timestamp(name);
            found_timestamp = true;
        } else {
            builder = builder.column(name, column_type);
        }
    }

    if !found_timestamp {
        return Err(Error::General(format!(
            "designated timestamp '{}' is not in the schema",
            timestamp
        )));
    }
    Ok(builder.build())
}

fn decode_cell(
    raw: Option<&serde_json::Value>,
    column_type: ColumnType,
    name: &str,
) -> Result<Value, Error> {
    let raw = match raw {
        None | Some(serde_json::Value::Null) => return Ok(null_of(column_type)),
        Some(raw) => raw,
    };
    let mismatch = || Error::General(format!("column '{}' expects {}, got {}", name, column_type, raw));

    match column_type {
        ColumnType::Double => raw.as_f64().map(Value::Double).ok_or_else(mismatch),
        ColumnType::Long => raw.as_i64().map(Value::Long).ok_or_else(mismatch),
        ColumnType::Symbol => match raw {
            serde_json::Value::String(s) => Ok(Value::Symbol(Some(s.clone()))),
            other => Ok(Value::Symbol(Some(other.to_string()))),
        },
        ColumnType::Timestamp => match raw {
            serde_json::Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
                .map(|dt| Value::Timestamp(dt.timestamp_micros()))
                .map_err(|e| Error::General(format!("column '{}': {}", name, e))),
            other => other.as_i64().map(Value::Timestamp).ok_or_else(mismatch),
        },
    }
}

fn null_of(column_type: ColumnType) -> Value {
    match column_type {
        ColumnType::Double => Value::Double(f64::NAN),
        ColumnType::Long => Value::Long(LONG_NULL),
        ColumnType::Timestamp => Value::Timestamp(TIMESTAMP_NULL),
        ColumnType::Symbol => Value::Symbol(None),
    }
}

fn read_rows(
    reader: impl BufRead,
    metadata: &RecordMetadata,
) -> Result<Vec<Vec<Value>>, Error> {
    let mut rows = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&line)
            .map_err(|e| Error::Serialization(format!("line {}: {}", line_no + 1, e)))?;

        let row = metadata
            .columns()
            .iter()
            .map(|c| decode_cell(object.get(&c.name), c.column_type, &c.name))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(row);
    }
    Ok(rows)
}

// =============================================================================
// Command Handlers
// =============================================================================

fn load_config(cli: &Cli) -> Result<Config, Error> {
    let path = cli
        .config
        .clone()
        .or_else(|| std::env::var("SAMPLEBY_CONFIG").ok().map(PathBuf::from));

    let config = match path {
        Some(path) => Config::from_file_with_env(&path.to_string_lossy())?,
        None => Config::from_env(),
    };
    config.validate()?;
    Ok(config)
}

fn cmd_run(args: &RunArgs, config: &Config) -> Result<(), Box<dyn StdError>> {
    let metadata = Arc::new(parse_schema(&args.schema, &args.timestamp)?);
    let fill: FillStrategy = args.fill.parse()?;
    let format: ResultFormat = args.format.parse()?;

    let mut builder = SampleByQuery::builder()
        .interval_str(&args.interval)?
        .fill(fill);
    for aggregate in AggregateSpec::parse_list(&args.aggregates)? {
        builder = builder.aggregate(aggregate);
    }
    if let Some(keys) = &args.keys {
        for key in keys.split(',').map(str::trim).filter(|k| !k.is_empty()) {
            builder = builder.key(key);
        }
    }
    let query = builder.build()?;

    let rows = match &args.input {
        Some(path) => read_rows(BufReader::new(File::open(path)?), &metadata)?,
        None => read_rows(io::stdin().lock(), &metadata)?,
    };
    debug!(rows = rows.len(), query = %query, "Input loaded");

    let source = ScanOperator::from_rows(metadata, rows)?
        .with_batch_size(config.engine.batch_size);
    let mut executor = QueryExecutor::with_config(config.executor_config());
    let result = executor.execute_sample_by(&query, Box::new(source))?;

    info!(
        rows = result.row_count(),
        elapsed_us = result.metadata.execution_time_us,
        "Query finished"
    );

    let mut stdout = io::stdout().lock();
    stdout.write_all(result.format(format).as_bytes())?;
    if !matches!(format, ResultFormat::JsonLines | ResultFormat::Csv | ResultFormat::Table) {
        stdout.write_all(b"\n")?;
    }
    for warning in &result.metadata.warnings {
        eprintln!("warning: {}", warning);
    }
    Ok(())
}

fn cmd_check_config(config: &Config) -> Result<(), Box<dyn StdError>> {
    println!("Configuration is valid!");
    println!();
    println!("Engine:");
    println!("  Group table: {}", config.engine.group_table);
    println!("  Initial group capacity: {}", config.engine.initial_group_capacity);
    println!("  Max groups: {}", config.engine.max_groups);
    println!("  Batch size: {}", config.engine.batch_size);
    println!();
    println!("Execution:");
    println!("  Memory limit: {} MB", config.execution.memory_limit_mb);
    println!("  Timeout: {} ms", config.execution.timeout_ms);
    println!("  Max result rows: {}", config.execution.max_result_rows);
    println!();
    println!("Monitoring:");
    println!("  Metrics enabled: {}", config.monitoring.metrics_enabled);
    println!("  Log level: {}", config.monitoring.log_level);
    Ok(())
}

fn main() -> Result<(), Box<dyn StdError>> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.monitoring.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    if config.monitoring.metrics_enabled {
        metrics::init();
    }

    match &cli.command {
        Commands::Run(args) => cmd_run(args, &config),
        Commands::CheckConfig => cmd_check_config(&config),
        Commands::Metrics => {
            println!("{}", metrics::gather_metrics()?);
            Ok(())
        }
    }
}
