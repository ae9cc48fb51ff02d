//! Error types for the decision session analytics engine

use thiserror::Error;

/// Errors that abort a metrics computation.
///
/// Non-fatal anomalies are not errors; they are reported as
/// [`DataQualityWarning`](crate::types::DataQualityWarning) values next to the
/// computed metrics.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Malformed event log: {0}")]
    MalformedLog(String),

    #[error("Invalid value ranking: {0}")]
    InvalidRanking(String),

    #[error("Invalid outcome vector: {0}")]
    InvalidOutcome(String),

    #[error("Failed to parse session input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid engine configuration: {0}")]
    ConfigError(String),
}
