//! Error types for noesis-core.

use thiserror::Error;

/// Result type alias using noesis-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during decision-engine operations.
///
/// The five-stage pipeline degrades instead of failing: transient I/O and
/// parse problems are converted into fallback results inside the stages.
/// Only invariant violations and cancellation surface to the caller.
#[derive(Error, Debug)]
pub enum Error {
    /// Network/LLM/tool failure that survived the invoker's retries
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    /// LLM output did not match the expected schema
    #[error("parse failure in {context}: {message}")]
    ParseFailure { context: String, message: String },

    /// Missing or inconsistent engine configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A pipeline invariant was broken; the current decision is aborted
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The session cancelled the pipeline between stages
    #[error("decision cancelled: {0}")]
    Cancelled(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation exceeded its time budget
    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
}

impl Error {
    /// Create a transient I/O error.
    pub fn transient_io(message: impl Into<String>) -> Self {
        Self::TransientIo(message.into())
    }

    /// Create a parse-failure error with the parsing context named.
    pub fn parse_failure(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseFailure {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create an invariant-violation error.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    /// Create a cancellation error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled(message.into())
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Whether this error may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientIo(_) | Self::Timeout { .. })
    }
}
