//! `engine` crate — workflow models, validation, and the Workflow Engine.
//!
//! A workflow is an ordered list of tool-invocation steps with per-step
//! dependencies, conditions, and retry policy. The engine executes admitted
//! workflows step by step through the Execution Service, under the admission
//! control of the `queue` crate.

pub mod binding;
pub mod condition;
pub mod engine;
pub mod error;
pub mod models;
pub mod validate;

pub use condition::{CompareOp, Condition, Operand};
pub use engine::{EngineConfig, WorkflowEngine};
pub use error::EngineError;
pub use models::{
    ExecutionStep, ExecutionStepResult, ExecutionWorkflow, StepError, StepSpec, StepStatus,
    WorkflowOptions, WorkflowStatus,
};
pub use validate::validate_workflow;
