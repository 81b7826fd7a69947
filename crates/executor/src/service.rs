//! The Execution Service — brokers one tool invocation per request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio::sync::{watch, Notify};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use tools::{ToolDescriptor, ToolRegistry};

use crate::context::{ContextEvent, ContextPool};
use crate::progress::{ExecutionProgress, ExecutionStatus};
use crate::validation::{missing_outputs, validate_input};
use crate::ExecutionError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Applied when a request does not supply its own timeout.
    pub default_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(300),
        }
    }
}

/// Per-request options.
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Overrides [`ServiceConfig::default_timeout`] when set.
    pub timeout: Option<Duration>,
    pub validate_input: bool,
    pub validate_output: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            validate_input: true,
            validate_output: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome of a completed execution
// ---------------------------------------------------------------------------

/// The result of one successful execution.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub execution_id: String,
    pub result: Value,
    pub elapsed: Duration,
    /// Declared output fields the tool did not produce (advisory).
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Internal tracking
// ---------------------------------------------------------------------------

struct ExecutionEntry {
    progress: watch::Sender<ExecutionProgress>,
    cancelled: Arc<AtomicBool>,
    cancel_notify: Arc<Notify>,
}

// ---------------------------------------------------------------------------
// ExecutionService
// ---------------------------------------------------------------------------

/// Brokers requests to isolated execution contexts.
///
/// Owns every [`ExecutionProgress`] record for the lifetime of its request;
/// terminal records stay readable until [`ExecutionService::remove`].
pub struct ExecutionService {
    registry: Arc<ToolRegistry>,
    pool: ContextPool,
    config: ServiceConfig,
    executions: Mutex<HashMap<String, ExecutionEntry>>,
}

impl ExecutionService {
    pub fn new(registry: Arc<ToolRegistry>, pool: ContextPool, config: ServiceConfig) -> Self {
        Self {
            registry,
            pool,
            config,
            executions: Mutex::new(HashMap::new()),
        }
    }

    /// The pool this service spawns contexts from.
    pub fn pool(&self) -> &ContextPool {
        &self.pool
    }

    /// Execute one tool against one input map.
    ///
    /// Exactly one isolated context is spawned per accepted call; validation
    /// failures reject the request before any context exists.
    ///
    /// # Errors
    /// - `VALIDATION_ERROR` — descriptor not loadable, unknown code
    ///   reference, or bad input.
    /// - `EXECUTION_ERROR` — the tool failed (retryable iff the tool said
    ///   so), or the execution was cancelled.
    /// - `TIMEOUT` — no terminal report within the allotted time.
    /// - `WORKER_UNAVAILABLE` — the context pool refused to spawn.
    #[instrument(skip(self, input, options), fields(tool_id = %descriptor.id))]
    pub async fn execute(
        &self,
        descriptor: &ToolDescriptor,
        input: Map<String, Value>,
        options: ExecutionOptions,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        // ------------------------------------------------------------------
        // Fail fast: no context is spawned for an invalid request.
        // ------------------------------------------------------------------
        let code_ref = descriptor.code_ref.as_deref().ok_or_else(|| {
            ExecutionError::Validation(format!(
                "tool '{}' has no loadable code reference",
                descriptor.id
            ))
        })?;

        let runner = self.registry.runner(code_ref).ok_or_else(|| {
            ExecutionError::Validation(format!(
                "no implementation registered for code reference '{code_ref}'"
            ))
        })?;

        if options.validate_input {
            validate_input(descriptor, &input)?;
        }

        // ------------------------------------------------------------------
        // Create the tracking record, then the context.
        // ------------------------------------------------------------------
        let execution_id = Uuid::new_v4().to_string();
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancel_notify = Arc::new(Notify::new());
        let (progress_tx, _) = watch::channel(ExecutionProgress::new(&execution_id));

        {
            let mut executions = self.executions.lock().unwrap();
            executions.insert(
                execution_id.clone(),
                ExecutionEntry {
                    progress: progress_tx.clone(),
                    cancelled: cancelled.clone(),
                    cancel_notify: cancel_notify.clone(),
                },
            );
        }

        info!(execution_id = %execution_id, "execution accepted");

        let mut handle = match self.pool.spawn(
            runner,
            Value::Object(input),
            execution_id.clone(),
            cancelled.clone(),
        ) {
            Ok(handle) => handle,
            Err(err) => {
                progress_tx.send_modify(|p| p.fail(err.to_string()));
                return Err(err);
            }
        };

        // ------------------------------------------------------------------
        // Drive the state machine from context events.
        // ------------------------------------------------------------------
        let started = Instant::now();
        let timeout = options.timeout.unwrap_or(self.config.default_timeout);
        let deadline = tokio::time::Instant::now() + timeout;
        let timer = tokio::time::sleep_until(deadline);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                event = handle.events.recv() => match event {
                    Some(ContextEvent::Loading) => {
                        progress_tx.send_modify(|p| p.advance(ExecutionStatus::Loading));
                    }
                    Some(ContextEvent::Executing) => {
                        progress_tx.send_modify(|p| p.advance(ExecutionStatus::Executing));
                    }
                    Some(ContextEvent::Progress(percent)) => {
                        progress_tx.send_modify(|p| p.report(percent));
                    }
                    Some(ContextEvent::Completed(result)) => {
                        let warnings = if options.validate_output {
                            let missing = missing_outputs(descriptor, &result);
                            for field in &missing {
                                warn!(
                                    execution_id = %execution_id,
                                    field = %field,
                                    "declared output field missing from result"
                                );
                            }
                            missing
                        } else {
                            Vec::new()
                        };

                        progress_tx.send_modify(|p| p.complete());
                        let elapsed = started.elapsed();
                        info!(
                            execution_id = %execution_id,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "execution completed"
                        );
                        return Ok(ExecutionOutcome {
                            execution_id,
                            result,
                            elapsed,
                            warnings,
                        });
                    }
                    Some(ContextEvent::Failed(err)) => {
                        progress_tx.send_modify(|p| p.fail(err.to_string()));
                        warn!(execution_id = %execution_id, error = %err, "execution failed");
                        return Err(ExecutionError::from_tool(err));
                    }
                    None => {
                        // The context died without a terminal report.
                        let err = ExecutionError::WorkerUnavailable(
                            "execution context terminated without reporting".into(),
                        );
                        progress_tx.send_modify(|p| p.fail(err.to_string()));
                        return Err(err);
                    }
                },

                _ = cancel_notify.notified() => {
                    // `cancel` already marked the record; just settle the
                    // caller's future. The context keeps running into a
                    // closed channel until it notices the flag.
                    debug!(execution_id = %execution_id, "execution cancelled");
                    return Err(ExecutionError::Execution {
                        message: "execution cancelled by caller".into(),
                        retryable: false,
                    });
                }

                _ = &mut timer => {
                    cancelled.store(true, Ordering::SeqCst);
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    progress_tx.send_modify(|p| {
                        p.fail(format!("execution timed out after {elapsed_ms} ms"));
                    });
                    warn!(execution_id = %execution_id, elapsed_ms, "execution timed out");
                    return Err(ExecutionError::Timeout { elapsed_ms });
                }
            }
        }
    }

    /// Cancel a running execution. Fire-and-forget: the progress record is
    /// marked `cancelled` immediately and the context's eventual report is
    /// ignored; this never waits for the context to acknowledge.
    pub fn cancel(&self, execution_id: &str) {
        let executions = self.executions.lock().unwrap();
        if let Some(entry) = executions.get(execution_id) {
            entry.cancelled.store(true, Ordering::SeqCst);
            entry.progress.send_modify(|p| p.cancel());
            entry.cancel_notify.notify_one();
            info!(execution_id = %execution_id, "cancellation requested");
        } else {
            debug!(execution_id = %execution_id, "cancel for unknown execution");
        }
    }

    /// Current progress of an execution, if it is still tracked.
    pub fn progress(&self, execution_id: &str) -> Option<ExecutionProgress> {
        let executions = self.executions.lock().unwrap();
        executions
            .get(execution_id)
            .map(|entry| entry.progress.borrow().clone())
    }

    /// Subscribe to progress updates for an execution.
    ///
    /// Replaces poll loops: the receiver is notified on every state or
    /// progress change, including the terminal one.
    pub fn subscribe(&self, execution_id: &str) -> Option<watch::Receiver<ExecutionProgress>> {
        let executions = self.executions.lock().unwrap();
        executions
            .get(execution_id)
            .map(|entry| entry.progress.subscribe())
    }

    /// All currently tracked progress records.
    pub fn list(&self) -> Vec<ExecutionProgress> {
        let executions = self.executions.lock().unwrap();
        executions
            .values()
            .map(|entry| entry.progress.borrow().clone())
            .collect()
    }

    /// Drop a consumed record. Safe to call for unknown ids.
    pub fn remove(&self, execution_id: &str) {
        let mut executions = self.executions.lock().unwrap();
        executions.remove(execution_id);
    }
}
