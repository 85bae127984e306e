//! Query result types and formatters
//!
//! Provides structured result types and serialization to JSON, JSON lines,
//! CSV and an ASCII table for the CLI.

use crate::types::{ColumnMeta, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ============================================================================
// Query Result Types
// ============================================================================

/// Complete query result with data and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Query execution metadata
    pub metadata: ResultMetadata,

    /// Output columns
    pub columns: Vec<ColumnMeta>,

    /// Result rows, values in column order
    pub rows: Vec<ResultRow>,
}

impl QueryResult {
    /// Create an empty result with the given columns
    pub fn empty(columns: Vec<ColumnMeta>) -> Self {
        Self::new(columns, Vec::new())
    }

    /// Create result from rows
    pub fn new(columns: Vec<ColumnMeta>, rows: Vec<ResultRow>) -> Self {
        Self {
            metadata: ResultMetadata {
                row_count: rows.len(),
                ..Default::default()
            },
            columns,
            rows,
        }
    }

    /// Set execution time metadata
    pub fn with_execution_time(mut self, duration: Duration) -> Self {
        self.metadata.execution_time_us = duration.as_micros() as u64;
        self
    }

    /// Set rows scanned metadata
    pub fn with_rows_scanned(mut self, rows: u64) -> Self {
        self.metadata.rows_scanned = rows;
        self
    }

    /// Check if result is empty
    pub fn is_empty(&self) -> bool {
        self.metadata.row_count == 0
    }

    /// Get row count
    pub fn row_count(&self) -> usize {
        self.metadata.row_count
    }

    /// Position of the column called `name`
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Values of one column across all rows
    pub fn column_values(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().filter_map(|r| r.values.get(index)).collect())
    }

    /// Format result to string
    pub fn format(&self, format: ResultFormat) -> String {
        match format {
            ResultFormat::Json => self.to_json(),
            ResultFormat::JsonPretty => self.to_json_pretty(),
            ResultFormat::JsonLines => self.to_json_lines(),
            ResultFormat::Csv => self.to_csv(),
            ResultFormat::Table => self.to_table(),
        }
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Convert to pretty-printed JSON string
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// One JSON object per row, keyed by column name
    pub fn to_json_lines(&self) -> String {
        let mut output = String::new();
        for row in &self.rows {
            let object: serde_json::Map<String, serde_json::Value> = self
                .columns
                .iter()
                .zip(&row.values)
                .map(|(column, value)| {
                    (
                        column.name.clone(),
                        serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
                    )
                })
                .collect();
            output.push_str(&serde_json::Value::Object(object).to_string());
            output.push('\n');
        }
        output
    }

    /// Convert to CSV string
    pub fn to_csv(&self) -> String {
        let mut output = String::new();

        // Header
        let header: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        output.push_str(&header.join(","));
        output.push('\n');

        // Data rows
        for row in &self.rows {
            let cells: Vec<String> = row.values.iter().map(csv_cell).collect();
            output.push_str(&cells.join(","));
            output.push('\n');
        }

        output
    }

    /// Convert to ASCII table string
    pub fn to_table(&self) -> String {
        if self.rows.is_empty() {
            return "No results".to_string();
        }

        let shown: Vec<Vec<String>> = self
            .rows
            .iter()
            .take(100)
            .map(|r| r.values.iter().map(|v| v.to_string()).collect())
            .collect();

        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                shown
                    .iter()
                    .filter_map(|r| r.get(i))
                    .map(String::len)
                    .chain(std::iter::once(c.name.len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let separator: String = widths
            .iter()
            .map(|w| format!("+{}", "-".repeat(w + 2)))
            .collect::<String>()
            + "+\n";

        let mut output = String::new();
        output.push_str(&separator);
        for (column, width) in self.columns.iter().zip(&widths) {
            output.push_str(&format!("| {:^width$} ", column.name, width = *width));
        }
        output.push_str("|\n");
        output.push_str(&separator);

        // Data rows (limit to 100 for display)
        for row in &shown {
            for (cell, width) in row.iter().zip(&widths) {
                output.push_str(&format!("| {:>width$} ", cell, width = *width));
            }
            output.push_str("|\n");
        }
        output.push_str(&separator);

        if self.rows.len() > 100 {
            output.push_str(&format!("... and {} more rows\n", self.rows.len() - 100));
        }

        // Metadata footer
        output.push_str(&format!(
            "\n{} rows in {:.3}ms\n",
            self.metadata.row_count,
            self.metadata.execution_time_us as f64 / 1000.0
        ));

        output
    }
}

fn csv_cell(value: &Value) -> String {
    let text = value.to_string();
    if text.contains(',') || text.contains('"') || text.contains('\n') {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text
    }
}

/// Single result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    /// Cell values in column order
    pub values: Vec<Value>,
}

impl ResultRow {
    /// Create a new result row
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Value at `index`
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }
}

// ============================================================================
// Result Metadata
// ============================================================================

/// Query result metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Number of rows returned
    pub row_count: usize,

    /// Query execution time in microseconds
    pub execution_time_us: u64,

    /// Rows pulled from the root operator
    #[serde(skip_serializing_if = "is_zero")]
    #[serde(default)]
    pub rows_scanned: u64,

    /// Whether result is truncated due to limits
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[serde(default)]
    pub truncated: bool,

    /// Warning messages
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Helper for serde skip_serializing_if
fn is_zero(n: &u64) -> bool {
    *n == 0
}

impl ResultMetadata {
    /// Add a warning message
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

// ============================================================================
// Result Format
// ============================================================================

/// Output format for query results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultFormat {
    /// Compact JSON
    #[default]
    Json,
    /// Pretty-printed JSON
    JsonPretty,
    /// One JSON object per row
    JsonLines,
    /// CSV format
    Csv,
    /// ASCII table (for CLI)
    Table,
}

impl fmt::Display for ResultFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultFormat::Json => write!(f, "json"),
            ResultFormat::JsonPretty => write!(f, "json-pretty"),
            ResultFormat::JsonLines => write!(f, "jsonl"),
            ResultFormat::Csv => write!(f, "csv"),
            ResultFormat::Table => write!(f, "table"),
        }
    }
}

impl std::str::FromStr for ResultFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ResultFormat::Json),
            "json-pretty" | "jsonpretty" => Ok(ResultFormat::JsonPretty),
            "jsonl" | "json-lines" | "ndjson" => Ok(ResultFormat::JsonLines),
            "csv" => Ok(ResultFormat::Csv),
            "table" => Ok(ResultFormat::Table),
            _ => Err(format!("unknown format: {}", s)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnType;

    fn sample() -> QueryResult {
        QueryResult::new(
            vec![
                ColumnMeta {
                    name: "s".into(),
                    column_type: ColumnType::Symbol,
                },
                ColumnMeta {
                    name: "dist".into(),
                    column_type: ColumnType::Double,
                },
                ColumnMeta {
                    name: "k".into(),
                    column_type: ColumnType::Timestamp,
                },
            ],
            vec![
                ResultRow::new(vec![
                    Value::Symbol(Some("AAA".into())),
                    Value::Double(42.5),
                    Value::Timestamp(1000),
                ]),
                ResultRow::new(vec![
                    Value::Symbol(None),
                    Value::Double(f64::NAN),
                    Value::Timestamp(2000),
                ]),
            ],
        )
    }

    #[test]
    fn test_query_result_basics() {
        let result = sample();
        assert_eq!(result.row_count(), 2);
        assert!(!result.is_empty());
        assert_eq!(result.column_index("k"), Some(2));
        assert_eq!(
            result.column_values("dist").unwrap()[0],
            &Value::Double(42.5)
        );
        assert!(QueryResult::empty(Vec::new()).is_empty());
    }

    #[test]
    fn test_query_result_json() {
        let json = sample().to_json();
        assert!(json.contains("1000"));
        assert!(json.contains("42.5"));
        assert!(json.contains("AAA"));
    }

    #[test]
    fn test_query_result_json_lines() {
        let lines = sample().to_json_lines();
        let mut iter = lines.lines();
        let first: serde_json::Value = serde_json::from_str(iter.next().unwrap()).unwrap();
        assert_eq!(first["s"], "AAA");
        assert_eq!(first["dist"], 42.5);
        let second: serde_json::Value = serde_json::from_str(iter.next().unwrap()).unwrap();
        assert!(second["dist"].is_null());
        assert!(second["s"].is_null());
    }

    #[test]
    fn test_query_result_csv() {
        let csv = sample().to_csv();
        assert!(csv.starts_with("s,dist,k\n"));
        assert!(csv.contains("AAA,42.5,1000"));
        assert!(csv.contains(",,2000"));
    }

    #[test]
    fn test_query_result_table() {
        let table = sample().to_table();
        assert!(table.contains("dist"));
        assert!(table.contains("AAA"));
        assert!(table.contains("2 rows"));
    }

    #[test]
    fn test_result_format_parsing() {
        assert_eq!("json".parse::<ResultFormat>().unwrap(), ResultFormat::Json);
        assert_eq!("ndjson".parse::<ResultFormat>().unwrap(), ResultFormat::JsonLines);
        assert_eq!("csv".parse::<ResultFormat>().unwrap(), ResultFormat::Csv);
        assert_eq!(
            "table".parse::<ResultFormat>().unwrap(),
            ResultFormat::Table
        );
        assert!("xml".parse::<ResultFormat>().is_err());
    }

    #[test]
    fn test_result_metadata() {
        let mut metadata = ResultMetadata::default();
        metadata.add_warning("partial result due to timeout");

        assert_eq!(metadata.warnings.len(), 1);
    }
}
