//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow looks like in
//! memory. They serialize to/from JSON so workflow definitions can be loaded
//! from files and snapshots handed to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::condition::Condition;

// ---------------------------------------------------------------------------
// StepSpec
// ---------------------------------------------------------------------------

/// Caller-supplied definition of one workflow step.
///
/// Everything optional has an engine-side default; the caller's `id`, when
/// present, is kept for referencing the step from `depends_on`, conditions,
/// and input bindings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    /// Identifier unique within the workflow; auto-assigned when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Tool to invoke (descriptor id in the registry).
    pub tool_id: String,
    /// Input map; string values of the form `${stepId.path}` are resolved
    /// against prior completed results at execution time.
    #[serde(default)]
    pub input: Map<String, Value>,
    /// Step ids that must have completed before this step runs.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Optional gate; when it does not evaluate to true the step is skipped.
    #[serde(default)]
    pub condition: Option<Condition>,
    /// Maximum retries after the first attempt (default 3).
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Per-step timeout in milliseconds (default 5 minutes).
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// ExecutionStep
// ---------------------------------------------------------------------------

/// One step as owned by the engine.
///
/// `id` is the caller-visible identifier; `track_id` is globally unique and
/// disambiguates repeated runs of the same step in logs and results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub id: String,
    pub track_id: Uuid,
    pub tool_id: String,
    pub input: Map<String, Value>,
    pub depends_on: Vec<String>,
    pub condition: Option<Condition>,
    pub max_retries: u32,
    pub timeout_ms: u64,
}

// ---------------------------------------------------------------------------
// Step results
// ---------------------------------------------------------------------------

/// Terminal disposition of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
    Skipped,
}

/// Error recorded on a failed step result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepError {
    /// Stable code (`VALIDATION_ERROR`, `TIMEOUT`, …).
    pub code: String,
    pub message: String,
}

impl StepError {
    pub fn from_execution(err: &executor::ExecutionError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Append-only record of one step's terminal outcome.
///
/// Retried attempts produce no intermediate records; only the final outcome
/// is appended, carrying the number of retries actually used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStepResult {
    pub step_id: String,
    pub track_id: Uuid,
    /// Position of the step in the declared order.
    pub index: usize,
    pub status: StepStatus,
    /// Present iff `status == Completed`.
    pub result: Option<Value>,
    /// Present iff `status == Failed`.
    pub error: Option<StepError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub retry_count: u32,
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// Lifecycle of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Idle,
    Running,
    Completed,
    Failed,
    Paused,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

/// Submission options for one workflow run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorkflowOptions {
    /// Record step failures and keep going instead of aborting.
    pub continue_on_error: bool,
    /// Admission priority; higher runs first.
    pub priority: i32,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self { continue_on_error: false, priority: 0 }
    }
}

/// A workflow and its complete execution state, owned by the engine from
/// creation until explicit deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionWorkflow {
    pub id: Uuid,
    pub name: String,
    pub steps: Vec<ExecutionStep>,
    pub status: WorkflowStatus,
    /// Next step the execution loop will consider.
    pub current_step_index: usize,
    pub results: Vec<ExecutionStepResult>,
    pub options: WorkflowOptions,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionWorkflow {
    /// The recorded result for a step id, if any.
    pub fn result_for(&self, step_id: &str) -> Option<&ExecutionStepResult> {
        self.results.iter().rev().find(|r| r.step_id == step_id)
    }

    /// The payload of a *completed* step, used for dependency checks,
    /// condition references, and input bindings.
    pub fn completed_result(&self, step_id: &str) -> Option<&Value> {
        self.result_for(step_id)
            .filter(|r| r.status == StepStatus::Completed)
            .and_then(|r| r.result.as_ref())
    }

    /// Whether any step has a failed result.
    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|r| r.status == StepStatus::Failed)
    }

    /// Wall-clock duration from first step start to loop exit.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}
