//! Error types for rankfit
//!
//! This module defines all error types used throughout the library.

use thiserror::Error;

/// Error type for comparison-data and parameter validation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataError {
    /// A ranking does not cover the expected item set
    #[error("Ranking length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// A ranking repeats an item or references one out of range
    #[error("Not a permutation: item index {0} repeated or out of range")]
    NotAPermutation(usize),

    /// Vector/matrix dimensions disagree
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A scalar parameter is outside its valid domain
    #[error("Invalid parameter {name}: {value} ({constraint})")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        constraint: &'static str,
    },

    /// The item set is too small to estimate anything
    #[error("Need at least {required} items, got {actual}")]
    TooFewItems { required: usize, actual: usize },

    /// No observations to fit on
    #[error("Empty comparison data")]
    EmptyData,
}

impl DataError {
    /// Shorthand for an invalid-parameter error
    pub fn invalid(name: &'static str, value: f64, constraint: &'static str) -> Self {
        Self::InvalidParameter {
            name,
            value,
            constraint,
        }
    }
}

/// Top-level error type for estimation operations
#[derive(Debug, Error)]
pub enum EstimationError {
    /// Data or parameter validation failed
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// A numerical routine produced unusable values (non-finite
    /// likelihood, failed factorization, ...)
    #[error("Numerical failure: {0}")]
    Numerical(String),

    /// Worker pool construction failed
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

/// Result type alias for estimation operations
pub type EstResult<T> = Result<T, EstimationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_error_display() {
        let err = DataError::LengthMismatch {
            expected: 5,
            actual: 3,
        };
        assert_eq!(err.to_string(), "Ranking length mismatch: expected 5, got 3");

        let err = DataError::invalid("sigma", -1.0, "must be > 0");
        assert_eq!(err.to_string(), "Invalid parameter sigma: -1 (must be > 0)");
    }

    #[test]
    fn test_estimation_error_from_data_error() {
        let data_err = DataError::EmptyData;
        let est_err: EstimationError = data_err.into();
        assert!(matches!(est_err, EstimationError::Data(_)));
    }
}
