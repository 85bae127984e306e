//! Error types for the crate

use thiserror::Error;

use crate::aggregation::group_table::GroupTableError;
use crate::query::error::QueryError;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// Query planning or execution error
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// Group table error
    #[error("Group table error: {0}")]
    GroupTable(#[from] GroupTableError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// General error
    #[error("{0}")]
    General(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Validation errors
///
/// Raised by configuration and input validation
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Value is out of allowed range
    #[error("{field} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Field name being validated
        field: String,
        /// The invalid value
        value: String,
        /// Minimum allowed value
        min: String,
        /// Maximum allowed value
        max: String,
    },

    /// Required field is missing
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Invalid format
    #[error("Invalid format for {field}: {message}")]
    InvalidFormat {
        /// Field name being validated
        field: String,
        /// Description of the format error
        message: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    Failed(String),
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::Configuration(e.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_query_error_conversion() {
        let err: Error = QueryError::planning("no designated timestamp").into();
        assert!(matches!(err, Error::Query(_)));
        assert!(err.to_string().contains("no designated timestamp"));
    }

    #[test]
    fn test_validation_error_conversion() {
        let err: Error = ValidationError::OutOfRange {
            field: "batch_size".into(),
            value: "0".into(),
            min: "1".into(),
            max: "1048576".into(),
        }
        .into();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_group_table_error_source() {
        let err: Error = GroupTableError::CapacityExceeded { max: 4 }.into();
        assert!(err.to_string().contains("4"));
        assert!(err.source().is_some());
    }
}
