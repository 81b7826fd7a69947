//! `queue` crate — bounded-concurrency priority admission for workflows.
//!
//! `WorkflowQueue` decides *when a workflow may begin running*: at most
//! `max_running` workflows run at once; waiting entries are admitted highest
//! priority first, FIFO within a priority. Admission is non-preemptive — a
//! running workflow is never interrupted to make room.
//!
//! The queue is a pure data structure with no interior locking. The engine
//! owns the single critical section that mutates it.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced by queue admission bookkeeping.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The workflow already has a queued or running entry.
    #[error("workflow {0} already has a non-terminal queue entry")]
    AlreadyQueued(Uuid),
}

// ---------------------------------------------------------------------------
// QueueEntry
// ---------------------------------------------------------------------------

/// Lifecycle state of one queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueEntryStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl QueueEntryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueueEntryStatus::Completed | QueueEntryStatus::Failed | QueueEntryStatus::Cancelled
        )
    }
}

/// One workflow's admission record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub workflow_id: Uuid,
    /// Higher runs first.
    pub priority: i32,
    pub enqueued_at: DateTime<Utc>,
    pub status: QueueEntryStatus,
    /// Monotonic admission sequence; breaks priority ties FIFO.
    pub seq: u64,
}

// ---------------------------------------------------------------------------
// Heap ordering
// ---------------------------------------------------------------------------

/// Max-heap key: highest priority first, then earliest enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    priority: i32,
    seq: u64,
    workflow_id: Uuid,
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ---------------------------------------------------------------------------
// QueueStatus
// ---------------------------------------------------------------------------

/// Point-in-time snapshot of the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    pub queued: usize,
    pub running: usize,
    pub max_running: usize,
    pub entries: Vec<QueueEntry>,
}

// ---------------------------------------------------------------------------
// WorkflowQueue
// ---------------------------------------------------------------------------

/// Priority queue with a cap on concurrently running workflows.
#[derive(Debug)]
pub struct WorkflowQueue {
    heap: BinaryHeap<Pending>,
    entries: HashMap<Uuid, QueueEntry>,
    max_running: usize,
    running: usize,
    next_seq: u64,
}

impl WorkflowQueue {
    pub fn new(max_running: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            entries: HashMap::new(),
            max_running: max_running.max(1),
            running: 0,
            next_seq: 0,
        }
    }

    /// Append a new entry in the `Queued` state.
    ///
    /// # Errors
    /// [`QueueError::AlreadyQueued`] if the workflow already has a
    /// non-terminal entry — a workflow has at most one at a time.
    pub fn enqueue(&mut self, workflow_id: Uuid, priority: i32) -> Result<(), QueueError> {
        if let Some(existing) = self.entries.get(&workflow_id) {
            if !existing.status.is_terminal() {
                return Err(QueueError::AlreadyQueued(workflow_id));
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        self.entries.insert(
            workflow_id,
            QueueEntry {
                workflow_id,
                priority,
                enqueued_at: Utc::now(),
                status: QueueEntryStatus::Queued,
                seq,
            },
        );
        self.heap.push(Pending { priority, seq, workflow_id });
        Ok(())
    }

    /// Admit the next waiting workflow if a running slot is free.
    ///
    /// Returns the admitted workflow id, now marked `Running`. Heap entries
    /// whose map record is no longer `Queued` (cancelled while waiting, or
    /// superseded by a re-enqueue) are discarded on the way.
    pub fn admit(&mut self) -> Option<Uuid> {
        if self.running >= self.max_running {
            return None;
        }

        while let Some(pending) = self.heap.pop() {
            let entry = match self.entries.get_mut(&pending.workflow_id) {
                Some(e) => e,
                None => continue,
            };
            // Stale heap entry: status changed or a newer enqueue exists.
            if entry.status != QueueEntryStatus::Queued || entry.seq != pending.seq {
                continue;
            }

            entry.status = QueueEntryStatus::Running;
            self.running += 1;
            return Some(pending.workflow_id);
        }

        None
    }

    /// Move a running entry to a terminal state, freeing its slot.
    pub fn finish(&mut self, workflow_id: Uuid, outcome: QueueEntryStatus) {
        debug_assert!(outcome.is_terminal());
        if let Some(entry) = self.entries.get_mut(&workflow_id) {
            if entry.status == QueueEntryStatus::Running {
                self.running = self.running.saturating_sub(1);
            }
            if !entry.status.is_terminal() {
                entry.status = outcome;
            }
        }
    }

    /// Cancel a still-queued entry. Running entries are untouched — the
    /// workflow loop reports those through [`WorkflowQueue::finish`].
    ///
    /// Returns whether an entry was cancelled.
    pub fn remove_pending(&mut self, workflow_id: Uuid) -> bool {
        match self.entries.get_mut(&workflow_id) {
            Some(entry) if entry.status == QueueEntryStatus::Queued => {
                entry.status = QueueEntryStatus::Cancelled;
                true
            }
            _ => false,
        }
    }

    /// Whether the workflow currently holds a queued or running entry.
    pub fn is_active(&self, workflow_id: Uuid) -> bool {
        self.entries
            .get(&workflow_id)
            .map(|e| !e.status.is_terminal())
            .unwrap_or(false)
    }

    pub fn running(&self) -> usize {
        self.running
    }

    /// Snapshot for callers; entries are ordered by admission sequence.
    pub fn status(&self) -> QueueStatus {
        let mut entries: Vec<QueueEntry> = self.entries.values().cloned().collect();
        entries.sort_by_key(|e| e.seq);
        QueueStatus {
            queued: entries
                .iter()
                .filter(|e| e.status == QueueEntryStatus::Queued)
                .count(),
            running: self.running,
            max_running: self.max_running,
            entries,
        }
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn admits_up_to_cap_then_queues() {
        let mut queue = WorkflowQueue::new(3);
        let workflows = ids(5);
        for id in &workflows {
            queue.enqueue(*id, 0).expect("fresh enqueue");
        }

        let mut admitted = Vec::new();
        while let Some(id) = queue.admit() {
            admitted.push(id);
        }

        assert_eq!(admitted.len(), 3);
        let status = queue.status();
        assert_eq!(status.running, 3);
        assert_eq!(status.queued, 2);
    }

    #[test]
    fn higher_priority_drains_first() {
        let mut queue = WorkflowQueue::new(1);
        let [low, high] = [Uuid::new_v4(), Uuid::new_v4()];
        queue.enqueue(low, 1).unwrap();
        queue.enqueue(high, 10).unwrap();

        assert_eq!(queue.admit(), Some(high));
        // Cap reached; nothing more until the running one finishes.
        assert_eq!(queue.admit(), None);

        queue.finish(high, QueueEntryStatus::Completed);
        assert_eq!(queue.admit(), Some(low));
    }

    #[test]
    fn equal_priority_is_fifo() {
        let mut queue = WorkflowQueue::new(1);
        let workflows = ids(3);
        for id in &workflows {
            queue.enqueue(*id, 5).unwrap();
        }

        let mut order = Vec::new();
        for _ in 0..3 {
            let admitted = queue.admit().expect("slot free");
            order.push(admitted);
            queue.finish(admitted, QueueEntryStatus::Completed);
        }

        assert_eq!(order, workflows);
    }

    #[test]
    fn duplicate_non_terminal_entry_is_rejected() {
        let mut queue = WorkflowQueue::new(3);
        let id = Uuid::new_v4();
        queue.enqueue(id, 0).unwrap();
        assert!(matches!(
            queue.enqueue(id, 0),
            Err(QueueError::AlreadyQueued(other)) if other == id
        ));

        // A terminal entry may be replaced by a fresh submission.
        let admitted = queue.admit().unwrap();
        queue.finish(admitted, QueueEntryStatus::Failed);
        assert!(queue.enqueue(id, 0).is_ok());
    }

    #[test]
    fn cancelled_pending_entry_is_skipped_on_admit() {
        let mut queue = WorkflowQueue::new(1);
        let [first, second] = [Uuid::new_v4(), Uuid::new_v4()];
        queue.enqueue(first, 10).unwrap();
        queue.enqueue(second, 1).unwrap();

        assert!(queue.remove_pending(first));
        assert_eq!(queue.admit(), Some(second));
    }

    #[test]
    fn remove_pending_does_not_touch_running() {
        let mut queue = WorkflowQueue::new(1);
        let id = Uuid::new_v4();
        queue.enqueue(id, 0).unwrap();
        assert_eq!(queue.admit(), Some(id));

        assert!(!queue.remove_pending(id));
        assert_eq!(queue.running(), 1);
    }

    #[test]
    fn finish_frees_a_slot_for_the_next_entry() {
        let mut queue = WorkflowQueue::new(2);
        let workflows = ids(3);
        for id in &workflows {
            queue.enqueue(*id, 0).unwrap();
        }

        assert!(queue.admit().is_some());
        assert!(queue.admit().is_some());
        assert_eq!(queue.admit(), None);

        queue.finish(workflows[0], QueueEntryStatus::Completed);
        assert_eq!(queue.admit(), Some(workflows[2]));
    }
}
