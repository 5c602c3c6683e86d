//! Error types for the deal extraction pipeline.
//!
//! Only `ExtractionError` ever reaches a caller, and only from the outer
//! surfaces (reading input files, building the HTTP client). Insight and
//! standardization failures are recovered inside the pipeline and surface
//! as low confidence, an explicit `source` tag, or a per-field annotation.

use thiserror::Error;

/// Failure of a single `DocumentInsightService` call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InsightError {
    #[error("Insight service unavailable: {0}")]
    Unavailable(String),

    #[error("Insight call timed out after {0}ms")]
    Timeout(u64),

    #[error("Insight service returned error (status {status}): {body}")]
    Http { status: u16, body: String },

    #[error("Unparseable insight response: {0}")]
    UnparseableResponse(String),

    #[error("Insight service returned an empty payload")]
    EmptyResponse,

    #[error("Insight call skipped: request cancelled")]
    Cancelled,
}

impl InsightError {
    /// True when the failure is a transport problem rather than bad content.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_) | Self::Http { .. })
    }
}

/// A value that could not be brought into canonical form.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StandardizationError {
    #[error("Unparseable date: '{0}'")]
    UnparseableDate(String),

    #[error("Unparseable number: '{0}'")]
    UnparseableNumber(String),

    #[error("Unparseable percentage: '{0}'")]
    UnparseablePercentage(String),

    #[error("Unknown currency: '{0}'")]
    UnknownCurrency(String),

    #[error("Unknown {kind} value: '{value}'")]
    UnknownCategory { kind: &'static str, value: String },

    #[error("Expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

/// Errors from the outer surfaces of the crate.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
