//! Exporter error types.
//!
//! Two families:
//! - `QueryError` - a single warehouse count query failed. Absorbed by the
//!   fail-soft query layer and never surfaced to a scrape consumer.
//! - `RegistryError` - the metric catalogue is malformed (bad names,
//!   duplicates, label mismatches). Raised at startup and fatal.

use std::time::Duration;
use thiserror::Error;

/// Failure of one warehouse count query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Query returned an invalid count: {0}")]
    InvalidResult(i64),
}

impl QueryError {
    /// Bounded reason label for failure metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            QueryError::Database(_) => "database",
            QueryError::Timeout(_) => "timeout",
            QueryError::InvalidResult(_) => "invalid_result",
        }
    }
}

/// Metric catalogue and registration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Invalid metric name: {0}")]
    InvalidName(String),

    #[error("Invalid label name '{label}' on metric {metric}")]
    InvalidLabelName { metric: String, label: String },

    #[error("Duplicate metric descriptor: {0}")]
    DuplicateDescriptor(String),

    #[error("Metric {metric} expects {expected} label values, got {actual}")]
    LabelCardinality {
        metric: String,
        expected: usize,
        actual: usize,
    },
}
