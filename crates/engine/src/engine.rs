//! Workflow engine and scheduler.
//!
//! `WorkflowEngine` is the central orchestrator:
//! 1. Owns every workflow from creation until explicit deletion.
//! 2. Admits submitted workflows through the bounded-concurrency priority
//!    queue and runs each admitted workflow as an independent task.
//! 3. Iterates steps in declaration order, honoring dependencies,
//!    conditions, per-step timeouts, and retry with exponential back-off.
//! 4. Exposes pause/resume/cancel over the whole workflow; all three are
//!    honored at step boundaries only.
//!
//! The workflow map, the queue, and the running count are the only shared
//! mutable state; every mutation happens inside one mutex so a drain pass
//! can never admit past the concurrency cap.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use executor::{ExecutionError, ExecutionOptions, ExecutionOutcome, ExecutionService};
use queue::{QueueEntryStatus, QueueStatus, WorkflowQueue};
use tools::ToolRegistry;

use crate::binding::bind_inputs;
use crate::models::{
    ExecutionStep, ExecutionStepResult, ExecutionWorkflow, StepError, StepSpec, StepStatus,
    WorkflowOptions, WorkflowStatus,
};
use crate::validate::validate_workflow;
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Workflows allowed in the running state simultaneously.
    pub max_concurrent_workflows: usize,
    /// Base delay for exponential back-off between step retries.
    pub retry_base_delay: Duration,
    /// Applied when a step does not declare its own timeout.
    pub default_step_timeout: Duration,
    /// Applied when a step does not declare its own retry budget.
    pub default_max_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workflows: 3,
            retry_base_delay: Duration::from_secs(1),
            default_step_timeout: Duration::from_secs(300),
            default_max_retries: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

struct EngineState {
    workflows: HashMap<Uuid, ExecutionWorkflow>,
    queue: WorkflowQueue,
}

/// How one pass of the execution loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    Completed,
    Failed,
    Cancelled,
    Paused,
}

/// What the loop decided to do next, snapshotted under the state lock.
enum NextAction {
    Run {
        index: usize,
        step: ExecutionStep,
        completed: HashMap<String, Value>,
        continue_on_error: bool,
    },
    Exit(LoopExit),
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// Orchestrates workflows over the Execution Service.
pub struct WorkflowEngine {
    service: Arc<ExecutionService>,
    registry: Arc<ToolRegistry>,
    config: EngineConfig,
    state: Mutex<EngineState>,
}

impl WorkflowEngine {
    pub fn new(
        service: Arc<ExecutionService>,
        registry: Arc<ToolRegistry>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let queue = WorkflowQueue::new(config.max_concurrent_workflows);
        Arc::new(Self {
            service,
            registry,
            config,
            state: Mutex::new(EngineState {
                workflows: HashMap::new(),
                queue,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        // Lock poisoning would mean a panic inside one of our own short
        // critical sections; there is nothing sensible to recover.
        self.state.lock().unwrap()
    }

    // -----------------------------------------------------------------------
    // Lifecycle API
    // -----------------------------------------------------------------------

    /// Register a new workflow from caller-supplied step specs.
    ///
    /// Assigns the workflow id and a globally unique tracking id per step;
    /// caller step ids (auto-filled as `step-{n}` when absent) are kept for
    /// dependencies, conditions, and input references.
    ///
    /// # Errors
    /// Validation errors for duplicate ids, unknown dependencies, or
    /// dependencies on later-declared steps.
    pub fn create_workflow(
        &self,
        name: impl Into<String>,
        specs: Vec<StepSpec>,
    ) -> Result<ExecutionWorkflow, EngineError> {
        let steps: Vec<ExecutionStep> = specs
            .into_iter()
            .enumerate()
            .map(|(index, spec)| ExecutionStep {
                id: spec.id.unwrap_or_else(|| format!("step-{}", index + 1)),
                track_id: Uuid::new_v4(),
                tool_id: spec.tool_id,
                input: spec.input,
                depends_on: spec.depends_on,
                condition: spec.condition,
                max_retries: spec.max_retries.unwrap_or(self.config.default_max_retries),
                timeout_ms: spec
                    .timeout_ms
                    .unwrap_or(self.config.default_step_timeout.as_millis() as u64),
            })
            .collect();

        validate_workflow(&steps)?;

        let workflow = ExecutionWorkflow {
            id: Uuid::new_v4(),
            name: name.into(),
            steps,
            status: WorkflowStatus::Idle,
            current_step_index: 0,
            results: Vec::new(),
            options: WorkflowOptions::default(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };

        info!(workflow_id = %workflow.id, steps = workflow.steps.len(), "workflow created");
        self.lock().workflows.insert(workflow.id, workflow.clone());
        Ok(workflow)
    }

    /// Submit a workflow for execution.
    ///
    /// The workflow is enqueued, never run inline; this returns as soon as
    /// the queue entry exists. Completion is observed via
    /// [`WorkflowEngine::get_workflow`]. A workflow in a terminal state is
    /// re-run from the start with cleared results.
    pub fn execute_workflow(
        self: &Arc<Self>,
        workflow_id: Uuid,
        options: WorkflowOptions,
    ) -> Result<(), EngineError> {
        {
            let mut state = self.lock();
            let workflow = state
                .workflows
                .get_mut(&workflow_id)
                .ok_or(EngineError::WorkflowNotFound(workflow_id))?;

            match workflow.status {
                WorkflowStatus::Running | WorkflowStatus::Paused => {
                    return Err(EngineError::InvalidTransition {
                        workflow_id,
                        status: workflow.status,
                        action: "execute",
                    });
                }
                status if status.is_terminal() => {
                    // Fresh submission: clear the previous run.
                    workflow.status = WorkflowStatus::Idle;
                    workflow.current_step_index = 0;
                    workflow.results.clear();
                    workflow.started_at = None;
                    workflow.finished_at = None;
                }
                WorkflowStatus::Idle => {}
                _ => {}
            }

            workflow.options = options;
            state.queue.enqueue(workflow_id, options.priority)?;
        }

        info!(workflow_id = %workflow_id, priority = options.priority, "workflow enqueued");
        self.drain();
        Ok(())
    }

    /// Cancel a workflow in any non-terminal state.
    ///
    /// A pending queue entry is removed immediately; a mid-flight execution
    /// loop observes the status before starting its next step and stops,
    /// leaving already-recorded results intact.
    pub fn cancel_workflow(&self, workflow_id: Uuid) -> Result<(), EngineError> {
        let mut state = self.lock();
        let workflow = state
            .workflows
            .get_mut(&workflow_id)
            .ok_or(EngineError::WorkflowNotFound(workflow_id))?;

        if workflow.status.is_terminal() {
            return Err(EngineError::InvalidTransition {
                workflow_id,
                status: workflow.status,
                action: "cancel",
            });
        }

        workflow.status = WorkflowStatus::Cancelled;
        workflow.finished_at = Some(Utc::now());
        state.queue.remove_pending(workflow_id);
        info!(workflow_id = %workflow_id, "workflow cancelled");
        Ok(())
    }

    /// Pause a running workflow at the next step boundary.
    pub fn pause_workflow(&self, workflow_id: Uuid) -> Result<(), EngineError> {
        let mut state = self.lock();
        let workflow = state
            .workflows
            .get_mut(&workflow_id)
            .ok_or(EngineError::WorkflowNotFound(workflow_id))?;

        if workflow.status != WorkflowStatus::Running {
            return Err(EngineError::InvalidTransition {
                workflow_id,
                status: workflow.status,
                action: "pause",
            });
        }

        workflow.status = WorkflowStatus::Paused;
        info!(workflow_id = %workflow_id, "workflow pause requested");
        Ok(())
    }

    /// Re-enqueue a paused workflow; it continues from `current_step_index`.
    pub fn resume_workflow(self: &Arc<Self>, workflow_id: Uuid) -> Result<(), EngineError> {
        {
            let mut state = self.lock();
            let workflow = state
                .workflows
                .get(&workflow_id)
                .ok_or(EngineError::WorkflowNotFound(workflow_id))?;

            // The previous loop must have parked (its queue entry gone
            // terminal) before the workflow can be admitted again.
            if workflow.status != WorkflowStatus::Paused || state.queue.is_active(workflow_id) {
                return Err(EngineError::InvalidTransition {
                    workflow_id,
                    status: workflow.status,
                    action: "resume",
                });
            }

            let priority = workflow.options.priority;
            state.queue.enqueue(workflow_id, priority)?;
        }

        info!(workflow_id = %workflow_id, "workflow resumed");
        self.drain();
        Ok(())
    }

    /// Snapshot of a workflow and its results.
    pub fn get_workflow(&self, workflow_id: Uuid) -> Option<ExecutionWorkflow> {
        self.lock().workflows.get(&workflow_id).cloned()
    }

    /// Snapshots of every registered workflow.
    pub fn list_workflows(&self) -> Vec<ExecutionWorkflow> {
        self.lock().workflows.values().cloned().collect()
    }

    /// Remove a workflow and its results. Refused while the workflow is
    /// running or holds a live queue entry.
    pub fn delete_workflow(&self, workflow_id: Uuid) -> Result<(), EngineError> {
        let mut state = self.lock();
        let workflow = state
            .workflows
            .get(&workflow_id)
            .ok_or(EngineError::WorkflowNotFound(workflow_id))?;

        if workflow.status == WorkflowStatus::Running || state.queue.is_active(workflow_id) {
            return Err(EngineError::InvalidTransition {
                workflow_id,
                status: workflow.status,
                action: "delete",
            });
        }

        state.workflows.remove(&workflow_id);
        info!(workflow_id = %workflow_id, "workflow deleted");
        Ok(())
    }

    /// Snapshot of the admission queue.
    pub fn queue_status(&self) -> QueueStatus {
        self.lock().queue.status()
    }

    // -----------------------------------------------------------------------
    // Scheduler
    // -----------------------------------------------------------------------

    /// Admit queued workflows while running slots are free.
    ///
    /// Called after every enqueue and after every loop exit; admission is
    /// the only place concurrency is enforced — running workflows are never
    /// preempted.
    fn drain(self: &Arc<Self>) {
        loop {
            let workflow_id = {
                let mut state = self.lock();
                match state.queue.admit() {
                    Some(id) => {
                        if let Some(workflow) = state.workflows.get_mut(&id) {
                            workflow.status = WorkflowStatus::Running;
                            if workflow.started_at.is_none() {
                                workflow.started_at = Some(Utc::now());
                            }
                        }
                        id
                    }
                    None => break,
                }
            };

            let engine = Arc::clone(self);
            tokio::spawn(async move {
                engine.run_workflow(workflow_id).await;
            });
        }
    }

    /// Drive one admitted workflow to a parked or terminal state, then
    /// release its slot and drain again.
    #[instrument(skip(self), fields(workflow_id = %workflow_id))]
    async fn run_workflow(self: Arc<Self>, workflow_id: Uuid) {
        info!("workflow admitted");
        let exit = self.run_steps(workflow_id).await;

        {
            let mut state = self.lock();
            if let Some(workflow) = state.workflows.get_mut(&workflow_id) {
                match exit {
                    LoopExit::Completed | LoopExit::Failed => {
                        // A concurrent cancel may have already sealed the
                        // status; terminal states are never overwritten.
                        if !workflow.status.is_terminal() {
                            workflow.status = if exit == LoopExit::Completed {
                                WorkflowStatus::Completed
                            } else {
                                WorkflowStatus::Failed
                            };
                            workflow.finished_at = Some(Utc::now());
                        }
                    }
                    // cancel/pause already stamped the workflow.
                    LoopExit::Cancelled | LoopExit::Paused => {}
                }
            }

            let outcome = match exit {
                LoopExit::Completed => QueueEntryStatus::Completed,
                LoopExit::Failed => QueueEntryStatus::Failed,
                LoopExit::Cancelled | LoopExit::Paused => QueueEntryStatus::Cancelled,
            };
            state.queue.finish(workflow_id, outcome);
        }

        info!(exit = ?exit, "workflow loop finished");
        self.drain();
    }

    // -----------------------------------------------------------------------
    // Execution loop
    // -----------------------------------------------------------------------

    async fn run_steps(&self, workflow_id: Uuid) -> LoopExit {
        loop {
            // ---- Decide the next action under the lock. ----
            let action = {
                let mut state = self.lock();
                let workflow = match state.workflows.get_mut(&workflow_id) {
                    Some(w) => w,
                    // Deleted out from under us; nothing left to record.
                    None => return LoopExit::Cancelled,
                };

                match workflow.status {
                    WorkflowStatus::Cancelled => NextAction::Exit(LoopExit::Cancelled),
                    WorkflowStatus::Paused => NextAction::Exit(LoopExit::Paused),
                    _ if workflow.current_step_index >= workflow.steps.len() => {
                        NextAction::Exit(if workflow.has_failures() {
                            LoopExit::Failed
                        } else {
                            LoopExit::Completed
                        })
                    }
                    _ => {
                        let index = workflow.current_step_index;
                        let step = workflow.steps[index].clone();
                        let completed = workflow
                            .steps
                            .iter()
                            .filter_map(|s| {
                                workflow
                                    .completed_result(&s.id)
                                    .map(|value| (s.id.clone(), value.clone()))
                            })
                            .collect();
                        NextAction::Run {
                            index,
                            step,
                            completed,
                            continue_on_error: workflow.options.continue_on_error,
                        }
                    }
                }
            };

            let (index, step, completed, continue_on_error) = match action {
                NextAction::Exit(exit) => return exit,
                NextAction::Run { index, step, completed, continue_on_error } => {
                    (index, step, completed, continue_on_error)
                }
            };

            // ---- 1. Dependencies must have completed results. ----
            if let Some(missing) = step
                .depends_on
                .iter()
                .find(|dep| !completed.contains_key(*dep))
            {
                let err = ExecutionError::DependencyFailed {
                    step: step.id.clone(),
                    missing: missing.clone(),
                };
                warn!(step_id = %step.id, missing = %missing, "dependency not completed");
                if self.record_failure(workflow_id, &step, index, &err, 0, continue_on_error) {
                    return LoopExit::Failed;
                }
                continue;
            }

            // ---- 2. Conditional gate: skip without consuming retries. ----
            if let Some(condition) = &step.condition {
                if condition.evaluate(&completed) != Some(true) {
                    info!(step_id = %step.id, "condition not satisfied, skipping step");
                    self.record_result(workflow_id, skipped_result(&step, index));
                    continue;
                }
            }

            // ---- 3. Bind `${step.path}` references in the input. ----
            let input = match bind_inputs(&step.input, &completed) {
                Ok(bound) => bound,
                Err(err) => {
                    let err = ExecutionError::Validation(err.to_string());
                    warn!(step_id = %step.id, error = %err, "input binding failed");
                    if self.record_failure(workflow_id, &step, index, &err, 0, continue_on_error) {
                        return LoopExit::Failed;
                    }
                    continue;
                }
            };

            // ---- 4/5. Execute through the service, retrying on retryable
            //           failures with exponential back-off. ----
            let mut retries = 0u32;
            let outcome = loop {
                match self.execute_step(&step, input.clone()).await {
                    Ok(outcome) => break Ok(outcome),
                    Err(err) if err.is_retryable() && retries < step.max_retries => {
                        retries += 1;
                        let delay = self.config.retry_base_delay
                            * 2u32.pow(retries.saturating_sub(1).min(16));
                        warn!(
                            step_id = %step.id,
                            attempt = retries,
                            max_retries = step.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "step failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Err(err) => break Err(err),
                }
            };

            // ---- 6. Record the terminal outcome for this step. ----
            match outcome {
                Ok(execution) => {
                    info!(step_id = %step.id, retries, "step completed");
                    // The engine consumed the terminal state; release the
                    // service-side progress record.
                    self.service.remove(&execution.execution_id);
                    self.record_result(workflow_id, completed_result(&step, index, execution, retries));
                }
                Err(err) => {
                    warn!(step_id = %step.id, retries, error = %err, "step failed terminally");
                    if self.record_failure(workflow_id, &step, index, &err, retries, continue_on_error)
                    {
                        return LoopExit::Failed;
                    }
                }
            }
        }
    }

    /// One tool invocation via the Execution Service.
    async fn execute_step(
        &self,
        step: &ExecutionStep,
        input: Map<String, Value>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let descriptor = self
            .registry
            .descriptor(&step.tool_id)
            .cloned()
            .ok_or_else(|| {
                ExecutionError::Validation(format!(
                    "no tool registered with id '{}'",
                    step.tool_id
                ))
            })?;

        let options = ExecutionOptions {
            timeout: Some(Duration::from_millis(step.timeout_ms)),
            ..Default::default()
        };
        self.service.execute(&descriptor, input, options).await
    }

    /// Append a result and advance the step cursor.
    fn record_result(&self, workflow_id: Uuid, result: ExecutionStepResult) {
        let mut state = self.lock();
        if let Some(workflow) = state.workflows.get_mut(&workflow_id) {
            workflow.current_step_index = result.index + 1;
            workflow.results.push(result);
        }
    }

    /// Append a failed result; returns `true` when the workflow must abort.
    fn record_failure(
        &self,
        workflow_id: Uuid,
        step: &ExecutionStep,
        index: usize,
        err: &ExecutionError,
        retries: u32,
        continue_on_error: bool,
    ) -> bool {
        self.record_result(workflow_id, failed_result(step, index, err, retries));
        !continue_on_error
    }
}

// ---------------------------------------------------------------------------
// Result constructors
// ---------------------------------------------------------------------------

fn completed_result(
    step: &ExecutionStep,
    index: usize,
    outcome: ExecutionOutcome,
    retries: u32,
) -> ExecutionStepResult {
    let finished_at = Utc::now();
    ExecutionStepResult {
        step_id: step.id.clone(),
        track_id: step.track_id,
        index,
        status: StepStatus::Completed,
        result: Some(outcome.result),
        error: None,
        started_at: finished_at
            - chrono::Duration::milliseconds(outcome.elapsed.as_millis() as i64),
        finished_at,
        retry_count: retries,
    }
}

fn failed_result(
    step: &ExecutionStep,
    index: usize,
    err: &ExecutionError,
    retries: u32,
) -> ExecutionStepResult {
    let now = Utc::now();
    ExecutionStepResult {
        step_id: step.id.clone(),
        track_id: step.track_id,
        index,
        status: StepStatus::Failed,
        result: None,
        error: Some(StepError::from_execution(err)),
        started_at: now,
        finished_at: now,
        retry_count: retries,
    }
}

fn skipped_result(step: &ExecutionStep, index: usize) -> ExecutionStepResult {
    let now = Utc::now();
    ExecutionStepResult {
        step_id: step.id.clone(),
        track_id: step.track_id,
        index,
        status: StepStatus::Skipped,
        result: None,
        error: None,
        started_at: now,
        finished_at: now,
        retry_count: 0,
    }
}
