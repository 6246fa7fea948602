//! Analytics error types.

use chrono::{DateTime, Utc};
use domain::{LookupError, RepositoryError};
use thiserror::Error;

/// Errors that can occur while computing aggregates.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// The order repository failed.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// An address lookup failed.
    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    /// A sum left the decimal range.
    #[error("{aggregate} exceeds the supported amount range")]
    Overflow { aggregate: &'static str },

    /// The range ends before it starts.
    #[error("Invalid date range: {from} is after {to}")]
    InvalidRange {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

/// Result type for analytics operations.
pub type Result<T> = std::result::Result<T, AnalyticsError>;
