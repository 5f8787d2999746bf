//! Error types for observation validation and configuration.

use thiserror::Error;

use crate::types::Metric;

/// Result type alias for validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// An observation that cannot be handed to the change detector.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("entity key is empty after normalization")]
    EmptyKey,

    #[error("metric value {0} has no name")]
    UnnamedMetric(i64),

    #[error("unknown metric: {0}")]
    UnknownMetric(String),

    #[error("metric {name} is negative: {value}")]
    NegativeMetric { name: String, value: i64 },

    #[error("metric {0} reported more than once")]
    DuplicateMetric(Metric),
}

/// Errors raised while validating a loaded configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("change_threshold must be a finite, non-negative fraction, got {0}")]
    InvalidThreshold(f64),

    #[error("invalid duration {0:?} (expected e.g. \"30s\", \"15m\", \"12h\", \"7d\")")]
    InvalidDuration(String),

    #[error("ingest concurrency must be at least 1")]
    InvalidConcurrency,
}
