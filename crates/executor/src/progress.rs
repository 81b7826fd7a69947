//! Per-execution progress record and its state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ExecutionStatus
// ---------------------------------------------------------------------------

/// Lifecycle of one execution:
/// `initializing → loading → executing → {completed | error | cancelled}`.
///
/// The three right-hand states are terminal; no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Initializing,
    Loading,
    Executing,
    Completed,
    Error,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Error | ExecutionStatus::Cancelled
        )
    }
}

// ---------------------------------------------------------------------------
// ExecutionProgress
// ---------------------------------------------------------------------------

/// Progress of one execution, owned by the Execution Service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionProgress {
    pub execution_id: String,
    /// 0–100. Monotonic: out-of-order reports never lower it.
    pub progress: u8,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ExecutionProgress {
    pub fn new(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            progress: 0,
            status: ExecutionStatus::Initializing,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    /// Advance to a non-terminal phase. Ignored once a terminal state is
    /// reached — late reports from an abandoned context must not resurrect
    /// the record.
    pub(crate) fn advance(&mut self, status: ExecutionStatus) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
    }

    /// Record a progress report, keeping the max observed value.
    pub(crate) fn report(&mut self, percent: u8) {
        if self.status.is_terminal() {
            return;
        }
        self.progress = self.progress.max(percent.min(100));
    }

    pub(crate) fn complete(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = ExecutionStatus::Completed;
        self.progress = 100;
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = ExecutionStatus::Error;
        self.error = Some(message.into());
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn cancel(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = ExecutionStatus::Cancelled;
        self.finished_at = Some(Utc::now());
    }
}
