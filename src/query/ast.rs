//! SAMPLE BY query description
//!
//! Defines the structure of a time-bucketed aggregation query:
//!
//! ```sql
//! SELECT s, haversine_dist_deg(lat, lon, k), k
//! FROM tab
//! SAMPLE BY 1h FILL(LINEAR)
//! ```
//!
//! - **Keys**: non-timestamp grouping columns, passed through to the output
//! - **Aggregates**: functions computed per group and bucket
//! - **Interval**: bucket width, fixed or calendar
//! - **Fill**: policy for buckets in which a group has no rows
//!
//! # Example
//!
//! ```rust
//! use kuba_sampleby::query::ast::{AggregateSpec, FillStrategy, SampleByQuery};
//!
//! let query = SampleByQuery::builder()
//!     .key("s")
//!     .aggregate(AggregateSpec::parse("haversine_dist_deg(lat, lon, k)").unwrap())
//!     .interval_str("1h")
//!     .unwrap()
//!     .fill(FillStrategy::Linear)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(query.keys, vec!["s".to_string()]);
//! ```

use std::fmt;
use std::str::FromStr;

use super::error::QueryError;
use crate::aggregation::sampler::SamplingInterval;

// ============================================================================
// Fill Strategy
// ============================================================================

/// Strategy for buckets in which a group has no rows
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum FillStrategy {
    /// No fill - omit empty buckets
    #[default]
    None,
    /// Fill with previous value
    Previous,
    /// Linear interpolation between the surrounding observations
    Linear,
    /// Fill with specific value
    Value(f64),
}

impl FillStrategy {
    /// Parse `NONE`, `LINEAR`, `PREV` or `VALUE(x)`, case-insensitive
    ///
    /// A bare numeric literal is accepted as `VALUE(x)`.
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        let trimmed = input.trim();
        let upper = trimmed.to_ascii_uppercase();
        match upper.as_str() {
            "NONE" => return Ok(Self::None),
            "LINEAR" => return Ok(Self::Linear),
            "PREV" | "PREVIOUS" => return Ok(Self::Previous),
            _ => {}
        }

        let literal = upper
            .strip_prefix("VALUE(")
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap_or(&upper);
        literal
            .trim()
            .parse::<f64>()
            .map(Self::Value)
            .map_err(|_| QueryError::parse(format!("unknown fill mode '{}'", trimmed)))
    }
}

impl fmt::Display for FillStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillStrategy::None => write!(f, "NONE"),
            FillStrategy::Previous => write!(f, "PREV"),
            FillStrategy::Linear => write!(f, "LINEAR"),
            FillStrategy::Value(v) => write!(f, "VALUE({})", v),
        }
    }
}

impl FromStr for FillStrategy {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ============================================================================
// Aggregates
// ============================================================================

/// An aggregate call in the select list
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AggregateSpec {
    /// `count()`
    Count,
    /// `sum(column)`
    Sum {
        /// Summed column
        column: String,
    },
    /// `haversine_dist_deg(lat, lon, ts)`
    HaversineDistDeg {
        /// Latitude column, degrees
        lat: String,
        /// Longitude column, degrees
        lon: String,
        /// Timestamp column
        ts: String,
    },
}

impl AggregateSpec {
    /// Parse a single call such as `sum(price)`
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        let input = input.trim();
        let (name, args) = match input.find('(') {
            Some(open) => {
                let args = input[open + 1..]
                    .strip_suffix(')')
                    .ok_or_else(|| QueryError::parse(format!("missing ')' in '{}'", input)))?;
                (&input[..open], args)
            }
            None => (input, ""),
        };

        let args: Vec<&str> = args
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .collect();

        match (name.trim().to_ascii_lowercase().as_str(), args.as_slice()) {
            ("count", []) => Ok(Self::Count),
            ("sum", [column]) => Ok(Self::Sum {
                column: column.to_string(),
            }),
            ("haversine_dist_deg", [lat, lon, ts]) => Ok(Self::HaversineDistDeg {
                lat: lat.to_string(),
                lon: lon.to_string(),
                ts: ts.to_string(),
            }),
            ("count", _) | ("sum", _) | ("haversine_dist_deg", _) => Err(QueryError::parse(
                format!("wrong number of arguments in '{}'", input),
            )),
            _ => Err(QueryError::parse(format!("unknown aggregate '{}'", input))),
        }
    }

    /// Parse a comma-separated list of calls, splitting only at top level
    pub fn parse_list(input: &str) -> Result<Vec<Self>, QueryError> {
        let mut specs = Vec::new();
        let mut depth = 0usize;
        let mut start = 0;

        for (i, c) in input.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| QueryError::parse(format!("unbalanced ')' in '{}'", input)))?
                }
                ',' if depth == 0 => {
                    specs.push(Self::parse(&input[start..i])?);
                    start = i + 1;
                }
                _ => {}
            }
        }
        if depth != 0 {
            return Err(QueryError::parse(format!("unbalanced '(' in '{}'", input)));
        }
        if !input[start..].trim().is_empty() {
            specs.push(Self::parse(&input[start..])?);
        }
        Ok(specs)
    }
}

impl fmt::Display for AggregateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateSpec::Count => write!(f, "count()"),
            AggregateSpec::Sum { column } => write!(f, "sum({})", column),
            AggregateSpec::HaversineDistDeg { lat, lon, ts } => {
                write!(f, "haversine_dist_deg({}, {}, {})", lat, lon, ts)
            }
        }
    }
}

// ============================================================================
// SAMPLE BY Query
// ============================================================================

/// A time-bucketed aggregation query
#[derive(Debug, Clone, PartialEq)]
pub struct SampleByQuery {
    /// Grouping columns, excluding the designated timestamp
    pub keys: Vec<String>,
    /// Aggregates in output order
    pub aggregates: Vec<AggregateSpec>,
    /// Bucket width
    pub interval: SamplingInterval,
    /// Policy for empty buckets
    pub fill: FillStrategy,
}

impl SampleByQuery {
    /// Start building a query
    pub fn builder() -> SampleByQueryBuilder {
        SampleByQueryBuilder::default()
    }
}

impl fmt::Display for SampleByQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT ")?;
        for key in &self.keys {
            write!(f, "{}, ", key)?;
        }
        for (i, agg) in self.aggregates.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", agg)?;
        }
        write!(f, " SAMPLE BY {} FILL({})", self.interval, self.fill)
    }
}

/// Fluent builder for [`SampleByQuery`]
#[derive(Debug, Default)]
pub struct SampleByQueryBuilder {
    keys: Vec<String>,
    aggregates: Vec<AggregateSpec>,
    interval: Option<SamplingInterval>,
    fill: FillStrategy,
}

impl SampleByQueryBuilder {
    /// Create a new query builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a grouping column
    pub fn key(mut self, column: impl Into<String>) -> Self {
        self.keys.push(column.into());
        self
    }

    /// Add an aggregate
    pub fn aggregate(mut self, spec: AggregateSpec) -> Self {
        self.aggregates.push(spec);
        self
    }

    /// Set the bucket width
    pub fn interval(mut self, interval: SamplingInterval) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Set the bucket width from text such as `30m`
    pub fn interval_str(self, interval: &str) -> Result<Self, QueryError> {
        Ok(self.interval(SamplingInterval::parse(interval)?))
    }

    /// Set the fill strategy
    pub fn fill(mut self, fill: FillStrategy) -> Self {
        self.fill = fill;
        self
    }

    /// Build the query
    pub fn build(self) -> Result<SampleByQuery, QueryError> {
        let interval = self
            .interval
            .ok_or_else(|| QueryError::validation("SAMPLE BY requires an interval"))?;
        if self.aggregates.is_empty() {
            return Err(QueryError::validation(
                "SAMPLE BY requires at least one aggregate",
            ));
        }

        Ok(SampleByQuery {
            keys: self.keys,
            aggregates: self.aggregates,
            interval,
            fill: self.fill,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::error::QueryErrorKind;

    #[test]
    fn test_fill_parse() {
        assert_eq!(FillStrategy::parse("none").unwrap(), FillStrategy::None);
        assert_eq!(FillStrategy::parse("LINEAR").unwrap(), FillStrategy::Linear);
        assert_eq!(FillStrategy::parse("prev").unwrap(), FillStrategy::Previous);
        assert_eq!(FillStrategy::parse("VALUE(2.5)").unwrap(), FillStrategy::Value(2.5));
        assert_eq!(FillStrategy::parse("-1").unwrap(), FillStrategy::Value(-1.0));
        assert_eq!(
            FillStrategy::parse("spline").unwrap_err().kind,
            QueryErrorKind::ParseError
        );
        assert_eq!(FillStrategy::Value(3.0).to_string(), "VALUE(3)");
    }

    #[test]
    fn test_aggregate_parse() {
        assert_eq!(AggregateSpec::parse("count()").unwrap(), AggregateSpec::Count);
        assert_eq!(AggregateSpec::parse("COUNT").unwrap(), AggregateSpec::Count);
        assert_eq!(
            AggregateSpec::parse(" sum( price ) ").unwrap(),
            AggregateSpec::Sum {
                column: "price".into()
            }
        );
        let spec = AggregateSpec::parse("haversine_dist_deg(lat, lon, k)").unwrap();
        assert_eq!(spec.to_string(), "haversine_dist_deg(lat, lon, k)");
    }

    #[test]
    fn test_aggregate_parse_errors() {
        for bad in ["sum()", "count(x)", "haversine_dist_deg(lat, lon)", "avg(x)", "sum(x"] {
            let err = AggregateSpec::parse(bad).unwrap_err();
            assert_eq!(err.kind, QueryErrorKind::ParseError, "input {:?}", bad);
        }
    }

    #[test]
    fn test_aggregate_parse_list() {
        let specs = AggregateSpec::parse_list("haversine_dist_deg(lat, lon, k), count()").unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1], AggregateSpec::Count);
        assert!(AggregateSpec::parse_list("sum(x))").is_err());
        assert!(AggregateSpec::parse_list("sum((x)").is_err());
    }

    #[test]
    fn test_builder() {
        let query = SampleByQuery::builder()
            .key("s")
            .aggregate(AggregateSpec::Count)
            .interval_str("15m")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(query.fill, FillStrategy::None);
        assert_eq!(query.to_string(), "SELECT s, count() SAMPLE BY 15m FILL(NONE)");
    }

    #[test]
    fn test_builder_requires_interval_and_aggregate() {
        assert!(SampleByQuery::builder()
            .aggregate(AggregateSpec::Count)
            .build()
            .is_err());
        assert!(SampleByQuery::builder()
            .interval_str("1h")
            .unwrap()
            .build()
            .is_err());
    }
}
