//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

use crate::models::WorkflowStatus;

/// Errors produced by the workflow engine (validation + lifecycle).
///
/// Step-level failures are not errors at this layer: they are recorded on
/// the workflow's `ExecutionStepResult` list and surface through the
/// workflow's terminal status.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors ------

    /// Two or more steps share the same ID.
    #[error("duplicate step ID: '{0}'")]
    DuplicateStepId(String),

    /// A step's `depends_on` references a step ID that doesn't exist.
    #[error("step '{step_id}' depends on unknown step '{reference}'")]
    UnknownStepReference {
        step_id: String,
        reference: String,
    },

    /// A step depends on a step declared after it. Steps execute in
    /// declaration order, so a forward dependency can never be satisfied.
    #[error("step '{step_id}' depends on later-declared step '{reference}'")]
    ForwardDependency {
        step_id: String,
        reference: String,
    },

    // ------ Lifecycle errors ------

    /// No workflow with this ID is registered.
    #[error("workflow {0} not found")]
    WorkflowNotFound(Uuid),

    /// The requested operation is not legal in the workflow's current state.
    #[error("cannot {action} workflow {workflow_id} while {status:?}")]
    InvalidTransition {
        workflow_id: Uuid,
        status: WorkflowStatus,
        action: &'static str,
    },

    /// Admission bookkeeping refused the submission.
    #[error(transparent)]
    Queue(#[from] queue::QueueError),
}
