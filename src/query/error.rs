//! Query error types
//!
//! Provides structured error handling for all SAMPLE BY phases: parsing of
//! intervals, fill modes and aggregate expressions, validation against the
//! input metadata, planning, engine construction and execution.

use std::fmt;

/// Query error with context
#[derive(Debug)]
pub struct QueryError {
    /// Error kind for programmatic handling
    pub kind: QueryErrorKind,
    /// Human-readable message
    pub message: String,
    /// Optional source error
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl QueryError {
    /// Create a new query error
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Add source error for error chaining
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::ParseError, message)
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::ValidationError, message)
    }

    /// Create a planning error
    pub fn planning(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::PlanningError, message)
    }

    /// Create a construction failure (engine could not acquire its resources)
    pub fn construction(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::ConstructionFailure, message)
    }

    /// Create an unsupported interpolation error
    pub fn unsupported_interpolation(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::UnsupportedInterpolation, message)
    }

    /// Create an execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::ExecutionError, message)
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Timeout, message)
    }

    /// Create a resource limit error
    pub fn resource_limit(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::ResourceLimit, message)
    }

    /// Create a cancellation error
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Cancelled, message)
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Internal, message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Categories of query errors for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryErrorKind {
    /// Malformed interval, fill mode or aggregate expression
    ParseError,
    /// Query references unknown columns or columns of the wrong type
    ValidationError,
    /// No valid execution plan (missing timestamp, unsupported fill mode)
    PlanningError,
    /// Engine could not acquire its group table or memory reservation
    ConstructionFailure,
    /// FILL(LINEAR) combined with an aggregate that cannot interpolate
    UnsupportedInterpolation,
    /// Query execution failed
    ExecutionError,
    /// Query exceeded time limit
    Timeout,
    /// Query exceeded resource limits (memory, group count, result size)
    ResourceLimit,
    /// Query was cancelled by user or system
    Cancelled,
    /// Internal error (bug, unexpected state)
    Internal,
}

impl QueryErrorKind {
    /// Stable label used for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryErrorKind::ParseError => "ParseError",
            QueryErrorKind::ValidationError => "ValidationError",
            QueryErrorKind::PlanningError => "PlanningError",
            QueryErrorKind::ConstructionFailure => "ConstructionFailure",
            QueryErrorKind::UnsupportedInterpolation => "UnsupportedInterpolation",
            QueryErrorKind::ExecutionError => "ExecutionError",
            QueryErrorKind::Timeout => "Timeout",
            QueryErrorKind::ResourceLimit => "ResourceLimit",
            QueryErrorKind::Cancelled => "Cancelled",
            QueryErrorKind::Internal => "Internal",
        }
    }
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = QueryError::parse("unexpected unit 'q'");
        assert_eq!(err.kind, QueryErrorKind::ParseError);
        assert!(err.message.contains("'q'"));
    }

    #[test]
    fn test_error_display() {
        let err = QueryError::unsupported_interpolation("count() cannot interpolate");
        let display = format!("{}", err);
        assert!(display.starts_with("UnsupportedInterpolation"));
        assert!(display.contains("count()"));
    }

    #[test]
    fn test_error_with_source() {
        use std::error::Error;
        let io_err = std::io::Error::new(std::io::ErrorKind::OutOfMemory, "no room");
        let err = QueryError::construction("group table allocation failed").with_source(io_err);
        assert_eq!(err.kind, QueryErrorKind::ConstructionFailure);
        assert!(err.source().is_some());
    }
}
