//! Isolated execution contexts and the pool that owns them.
//!
//! A context is a spawned task that loads a tool and runs it against one
//! input. It shares no mutable state with the orchestrator; everything it
//! has to say arrives over a message channel. Cancellation is cooperative —
//! the orchestrator raises a flag and stops listening, and a context that
//! keeps running talks into a closed channel.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use tools::{ExecutableTool, ProgressSender, ToolContext, ToolError};

use crate::ExecutionError;

/// Messages a context sends back to the service.
#[derive(Debug)]
pub(crate) enum ContextEvent {
    /// The context is loading the tool's code.
    Loading,
    /// The tool is running.
    Executing,
    /// In-flight progress report (0–100).
    Progress(u8),
    /// Terminal: the tool returned a result.
    Completed(Value),
    /// Terminal: the tool failed.
    Failed(ToolError),
}

/// Receiving half of one context's channel.
///
/// Dropping the handle is the tear-down: the context's sends start failing
/// silently and its eventual terminal message is discarded.
pub(crate) struct ContextHandle {
    pub(crate) events: mpsc::Receiver<ContextEvent>,
    _join: JoinHandle<()>,
}

/// Owned pool of isolated execution contexts.
///
/// The pool is injected into the Execution Service so its lifecycle is
/// explicit: once [`ContextPool::shutdown`] is called, no further context
/// can be spawned and `execute` fails with `WORKER_UNAVAILABLE`.
#[derive(Debug, Default)]
pub struct ContextPool {
    closed: AtomicBool,
    active: Arc<AtomicUsize>,
}

impl ContextPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of contexts currently alive.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop admitting new contexts. Already-running contexts finish on
    /// their own.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Spawn one context for one tool invocation.
    ///
    /// # Errors
    /// [`ExecutionError::WorkerUnavailable`] if the pool has been shut down.
    pub(crate) fn spawn(
        &self,
        runner: Arc<dyn ExecutableTool>,
        input: Value,
        execution_id: String,
        cancelled: Arc<AtomicBool>,
    ) -> Result<ContextHandle, ExecutionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ExecutionError::WorkerUnavailable(
                "execution context pool is shut down".into(),
            ));
        }

        let (event_tx, event_rx) = mpsc::channel(32);
        let (progress_tx, mut progress_rx) = mpsc::channel(32);

        // Forward raw progress reports onto the event channel so the service
        // drives everything from a single receiver.
        let forward_tx = event_tx.clone();
        tokio::spawn(async move {
            while let Some(percent) = progress_rx.recv().await {
                if forward_tx.send(ContextEvent::Progress(percent)).await.is_err() {
                    break;
                }
            }
        });

        let active = self.active.clone();
        active.fetch_add(1, Ordering::SeqCst);

        let join = tokio::spawn(async move {
            let _ = event_tx.send(ContextEvent::Loading).await;

            let ctx = ToolContext::new(
                execution_id.clone(),
                ProgressSender::new(progress_tx),
                cancelled,
            );

            let _ = event_tx.send(ContextEvent::Executing).await;

            let event = match runner.run(input, &ctx).await {
                Ok(result) => ContextEvent::Completed(result),
                Err(err) => ContextEvent::Failed(err),
            };
            if event_tx.send(event).await.is_err() {
                // Orchestrator stopped listening (timeout or cancel); the
                // report is dropped on the floor as designed.
                debug!(execution_id = %execution_id, "terminal report discarded");
            }

            active.fetch_sub(1, Ordering::SeqCst);
        });

        Ok(ContextHandle { events: event_rx, _join: join })
    }
}
