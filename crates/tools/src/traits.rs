//! The `ExecutableTool` trait — the contract every tool implementation fulfils.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::ToolError;

// ---------------------------------------------------------------------------
// ProgressSender
// ---------------------------------------------------------------------------

/// Channel a running tool uses to report progress back to the orchestrator.
///
/// Reports are best-effort: a full or closed channel drops the report rather
/// than blocking the tool. Values are clamped to 0–100.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::Sender<u8>,
}

impl ProgressSender {
    pub fn new(tx: mpsc::Sender<u8>) -> Self {
        Self { tx }
    }

    /// Report progress as a percentage.
    pub fn report(&self, percent: u8) {
        let _ = self.tx.try_send(percent.min(100));
    }
}

// ---------------------------------------------------------------------------
// ToolContext
// ---------------------------------------------------------------------------

/// Shared context passed to every tool during execution.
///
/// Defined here (in the tools crate) so both the executor and individual tool
/// implementations can import it without a circular dependency.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// ID of the current execution.
    pub execution_id: String,
    /// Progress reporting channel.
    pub progress: ProgressSender,
    /// Raised when the orchestrator has cancelled this execution.
    cancelled: Arc<AtomicBool>,
}

impl ToolContext {
    pub fn new(
        execution_id: impl Into<String>,
        progress: ProgressSender,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            progress,
            cancelled,
        }
    }

    /// Whether cancellation has been requested.
    ///
    /// Cancellation is cooperative: a long-running tool should poll this
    /// between units of work and return early when it flips.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// ExecutableTool
// ---------------------------------------------------------------------------

/// The core tool trait.
///
/// All built-in tools and loaded plugins must implement this.
#[async_trait]
pub trait ExecutableTool: Send + Sync {
    /// Run the tool against one input value and return its JSON output.
    async fn run(&self, input: Value, ctx: &ToolContext) -> Result<Value, ToolError>;
}
