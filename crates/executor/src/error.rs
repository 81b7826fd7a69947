//! Execution-level error taxonomy.

use thiserror::Error;
use tools::ToolError;

/// Errors produced while brokering a single tool execution.
///
/// The workflow layer consults [`ExecutionError::is_retryable`] to decide
/// whether a failed step may be re-attempted.
#[derive(Debug, Error, Clone)]
pub enum ExecutionError {
    /// Bad or missing input, or a descriptor that cannot be executed.
    #[error("validation error: {0}")]
    Validation(String),

    /// The tool itself failed or returned abnormally.
    #[error("execution error: {message}")]
    Execution { message: String, retryable: bool },

    /// No terminal report arrived within the allotted time.
    #[error("execution timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    /// A prerequisite step did not complete.
    #[error("step '{step}' depends on '{missing}', which did not complete")]
    DependencyFailed { step: String, missing: String },

    /// The isolated execution substrate failed to initialize.
    #[error("execution worker unavailable: {0}")]
    WorkerUnavailable(String),
}

impl ExecutionError {
    /// Stable error code recorded on step results.
    pub fn code(&self) -> &'static str {
        match self {
            ExecutionError::Validation(_) => "VALIDATION_ERROR",
            ExecutionError::Execution { .. } => "EXECUTION_ERROR",
            ExecutionError::Timeout { .. } => "TIMEOUT",
            ExecutionError::DependencyFailed { .. } => "DEPENDENCY_FAILED",
            ExecutionError::WorkerUnavailable(_) => "WORKER_UNAVAILABLE",
        }
    }

    /// Whether the workflow layer may re-attempt the same step.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExecutionError::Timeout { .. } | ExecutionError::WorkerUnavailable(_) => true,
            ExecutionError::Execution { retryable, .. } => *retryable,
            ExecutionError::Validation(_) | ExecutionError::DependencyFailed { .. } => false,
        }
    }

    /// Classify a tool failure.
    pub fn from_tool(err: ToolError) -> Self {
        ExecutionError::Execution {
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }
}
