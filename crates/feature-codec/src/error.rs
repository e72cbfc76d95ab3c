//! Validation Error Types

use thiserror::Error;

/// Errors while encoding raw form inputs into a feature vector
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Value out of allowed range
    #[error("{field} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: i64,
        max: i64,
    },

    /// Value is not a whole number
    #[error("{field} value {value} is not a whole number")]
    NotAnInteger { field: &'static str, value: f64 },

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Field not part of the feature set
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// Positional input of the wrong length
    #[error("Expected {expected} feature values, got {actual}")]
    WrongLength { expected: usize, actual: usize },
}
