//! Error types for Driveline

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::schema::ValidationError;

/// Errors that can occur during trip derivation and scoring
#[derive(Debug, Error)]
pub enum TelematicsError {
    #[error("Failed to parse telematics payload: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Missing policyholder id")]
    MissingPolicyholder,

    #[error("Unknown policyholder: {0}")]
    UnknownPolicyholder(String),

    #[error("Points out of order at index {index}: {current} precedes {previous}")]
    OutOfOrder {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
