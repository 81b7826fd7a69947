//! Tool-level error type.

use thiserror::Error;

/// Errors returned by a tool's `run` method.
///
/// The orchestration layers use the variant to decide retry behaviour:
/// - `Retryable` — the step may be re-attempted with exponential back-off.
/// - `Fatal`     — the execution is immediately marked as failed.
#[derive(Debug, Error, Clone)]
pub enum ToolError {
    /// Transient failure; the caller may re-try the invocation.
    #[error("retryable tool error: {0}")]
    Retryable(String),

    /// Permanent failure; no retry should be attempted.
    #[error("fatal tool error: {0}")]
    Fatal(String),
}

impl ToolError {
    /// Whether a retry of the same invocation could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ToolError::Retryable(_))
    }
}
