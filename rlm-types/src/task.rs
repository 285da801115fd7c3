//! The Task, its status, and the record of one iteration cycle.

use crate::duration::DurationMs;
use crate::id::TaskId;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a Task. Exactly one Task runs per engine at a time.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// No task has been submitted yet, or the previous one finished.
    Idle,
    /// The iteration loop is actively running.
    Running,
    /// Terminated successfully via `setFinal` or the iteration cap.
    Complete,
    /// Terminated by a cooperative cancellation request.
    Cancelled,
    /// Terminated by an unrecoverable failure (model transport error,
    /// three consecutive no-code responses).
    Error,
}

/// The unit of work submitted to the engine.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Opaque identifier assigned at submission.
    pub id: TaskId,
    /// The user's original message. Immutable for the life of the Task.
    pub message: String,
    /// Hard cap on iterations. Bound: `[1, 100]`, default 25.
    pub max_iterations: u32,
    /// Hard cap on sub-calls, shared across the whole Task. Bound: `[1, 200]`, default 50.
    pub max_sub_calls: u32,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Ordered record of every iteration executed so far.
    pub iterations: Vec<IterationRecord>,
    /// Sub-calls consumed so far, counted against `max_sub_calls`.
    pub sub_calls_used: u32,
}

impl Task {
    /// Create a freshly submitted, not-yet-started Task.
    pub fn new(id: TaskId, message: impl Into<String>, max_iterations: u32, max_sub_calls: u32) -> Self {
        Self {
            id,
            message: message.into(),
            max_iterations,
            max_sub_calls,
            status: TaskStatus::Idle,
            iterations: Vec::new(),
            sub_calls_used: 0,
        }
    }

    /// Whether another sub-call may be attempted without exceeding the cap.
    pub fn has_sub_call_budget(&self) -> bool {
        self.sub_calls_used < self.max_sub_calls
    }

    /// Whether another iteration may be started without exceeding the cap.
    pub fn has_iteration_budget(&self) -> bool {
        (self.iterations.len() as u32) < self.max_iterations
    }
}

/// One executed code block within an iteration.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockResult {
    /// The verbatim code that was executed.
    pub code: String,
    /// Structural summary of the result — never the raw output.
    pub metadata: String,
    /// Set if the block's execution captured an error (the REPL does not
    /// raise; this mirrors the `{__rlm_error}` sentinel for the history).
    pub error: Option<String>,
}

impl BlockResult {
    /// True if this block's execution captured an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// One model → execute cycle.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based iteration index.
    pub index: u32,
    /// Wall-clock offset from Task start when the iteration began.
    pub started_at: DurationMs,
    /// How long the iteration took end-to-end.
    pub duration: DurationMs,
    /// Every code block executed during this iteration, in order.
    pub blocks: Vec<BlockResult>,
    /// A short, mechanically derived human-readable intent summary.
    pub one_liner: String,
    /// The full metadata string appended to history (§4.1 step 9):
    /// `blocks` joined, prefixed `Block N:` when there is more than one.
    pub full_metadata: String,
    /// Tab changes observed immediately before this iteration started.
    pub page_changes: Vec<PageChange>,
}

impl IterationRecord {
    /// Whether this iteration produced no executable code blocks.
    pub fn is_no_code(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// A `{url, title, status}` snapshot of one browser tab at a point in time.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TabState {
    /// URL currently loaded.
    pub url: String,
    /// Document title.
    pub title: String,
    /// Loading status, e.g. `"loading"` / `"complete"`.
    pub status: String,
}

/// A full mapping from tab id to [`TabState`], captured at one instant.
pub type Snapshot = std::collections::BTreeMap<String, TabState>;

/// Which field of a [`TabState`] changed between two snapshots.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabField {
    /// The loaded URL changed.
    Url,
    /// The document title changed.
    Title,
    /// The load status changed.
    Status,
}

/// One changed field for one tab between two snapshots.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageChange {
    /// The tab that changed.
    pub tab_id: String,
    /// Which field changed.
    pub field: TabField,
    /// The value before.
    pub old: String,
    /// The value after.
    pub new: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_task_is_idle_with_full_budget() {
        let t = Task::new(TaskId::new("t1"), "hi", 25, 50);
        assert_eq!(t.status, TaskStatus::Idle);
        assert!(t.has_iteration_budget());
        assert!(t.has_sub_call_budget());
    }

    #[test]
    fn budget_exhausts_at_the_cap() {
        let mut t = Task::new(TaskId::new("t1"), "hi", 1, 1);
        t.sub_calls_used = 1;
        assert!(!t.has_sub_call_budget());
        t.iterations.push(IterationRecord {
            index: 1,
            started_at: DurationMs::ZERO,
            duration: DurationMs::ZERO,
            blocks: vec![],
            one_liner: "no-op".into(),
            full_metadata: String::new(),
            page_changes: vec![],
        });
        assert!(!t.has_iteration_budget());
    }

    #[test]
    fn block_result_is_error_tracks_the_error_field() {
        let ok = BlockResult { code: "1".into(), metadata: "void".into(), error: None };
        let err = BlockResult { code: "1".into(), metadata: "ERROR".into(), error: Some("boom".into()) };
        assert!(!ok.is_error());
        assert!(err.is_error());
    }
}
