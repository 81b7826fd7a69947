//! `MockTool` — a test double for `ExecutableTool`.
//!
//! Useful in unit and integration tests where a real tool implementation is
//! either unavailable or irrelevant.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::{ExecutableTool, ToolContext, ToolError};

/// Behaviour injected into `MockTool` at construction time.
pub enum MockBehaviour {
    /// Return a specific JSON value.
    ReturnValue(Value),
    /// Fail with a `Retryable` error.
    FailRetryable(String),
    /// Fail with a `Fatal` error.
    FailFatal(String),
    /// Fail `Retryable` for the first `n` calls, then return the value.
    FailThenSucceed { failures: u32, value: Value },
    /// Sleep for the given duration, then return the value.
    Delay { delay: Duration, value: Value },
    /// Never terminate (sleeps far past any reasonable timeout).
    Hang,
}

/// A mock tool that records every call it receives and returns a
/// programmer-specified result.
pub struct MockTool {
    /// Label used in test assertions.
    pub name: String,
    /// What the tool will do when `run` is called.
    pub behaviour: MockBehaviour,
    /// Progress values reported before the behaviour resolves.
    pub progress_reports: Vec<u8>,
    /// All inputs seen by this tool (in call order).
    pub calls: Arc<Mutex<Vec<Value>>>,
    attempts: AtomicU32,
}

impl MockTool {
    fn with_behaviour(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            progress_reports: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
            attempts: AtomicU32::new(0),
        }
    }

    /// Create a mock that always succeeds with the given value.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self::with_behaviour(name, MockBehaviour::ReturnValue(value))
    }

    /// Create a mock that always fails with a `Fatal` error.
    pub fn failing_fatal(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::FailFatal(msg.into()))
    }

    /// Create a mock that always fails with a `Retryable` error.
    pub fn failing_retryable(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::FailRetryable(msg.into()))
    }

    /// Create a mock that fails `failures` times, then succeeds with `value`.
    pub fn flaky(name: impl Into<String>, failures: u32, value: Value) -> Self {
        Self::with_behaviour(name, MockBehaviour::FailThenSucceed { failures, value })
    }

    /// Create a mock that sleeps for `delay`, then succeeds with `value`.
    pub fn delayed(name: impl Into<String>, delay: Duration, value: Value) -> Self {
        Self::with_behaviour(name, MockBehaviour::Delay { delay, value })
    }

    /// Create a mock that never terminates on its own.
    pub fn hanging(name: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Hang)
    }

    /// Report this sequence of progress values on every call.
    pub fn with_progress(mut self, reports: Vec<u8>) -> Self {
        self.progress_reports = reports;
        self
    }

    /// Number of times this tool has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ExecutableTool for MockTool {
    async fn run(&self, input: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        self.calls.lock().unwrap().push(input);
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);

        for percent in &self.progress_reports {
            ctx.progress.report(*percent);
        }

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(v.clone()),
            MockBehaviour::FailRetryable(msg) => Err(ToolError::Retryable(msg.clone())),
            MockBehaviour::FailFatal(msg) => Err(ToolError::Fatal(msg.clone())),
            MockBehaviour::FailThenSucceed { failures, value } => {
                if attempt < *failures {
                    Err(ToolError::Retryable(format!(
                        "{}: transient failure {}",
                        self.name,
                        attempt + 1
                    )))
                } else {
                    Ok(value.clone())
                }
            }
            MockBehaviour::Delay { delay, value } => {
                tokio::time::sleep(*delay).await;
                Ok(value.clone())
            }
            MockBehaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(86_400)).await;
                Err(ToolError::Fatal(format!("{}: hang elapsed", self.name)))
            }
        }
    }
}
