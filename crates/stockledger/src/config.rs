//! Configuration validation error type.
//!
//! Component configurations (cache, breaker, retry, bulkhead, store) are
//! built through validated `bon` builders that reject zero or degenerate
//! values with [`ConfigError`]. The error names the offending field so
//! misconfiguration is diagnosable from the message alone.

use thiserror::Error;

/// An invalid configuration value.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// A field was below its minimum allowed value.
    #[error("{field} must be at least {min}, got {value}")]
    BelowMinimum {
        /// The configuration field name.
        field: &'static str,
        /// The minimum allowed value.
        min: String,
        /// The rejected value.
        value: String,
    },

    /// A field that must be strictly positive was zero.
    #[error("{field} must be positive, got {value}")]
    MustBePositive {
        /// The configuration field name.
        field: &'static str,
        /// The rejected value.
        value: String,
    },

    /// A field fell outside its allowed range.
    #[error("{field} must be in ({min}, {max}], got {value}")]
    OutOfRange {
        /// The configuration field name.
        field: &'static str,
        /// Exclusive lower bound.
        min: String,
        /// Inclusive upper bound.
        max: String,
        /// The rejected value.
        value: String,
    },
}
