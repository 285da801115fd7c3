//! The `get_state()` snapshot (§6).

use rlm_types::{Task, TaskId, TaskStatus};

/// A read-only snapshot of the currently (or most recently) running Task,
/// returned by [`crate::Engine::get_state`]. Deliberately a plain struct
/// rather than `Task` itself — callers outside this crate should not be
/// able to mutate iteration history through a borrowed state handle.
#[derive(Debug, Clone)]
pub struct TaskState {
    /// The Task's id, if one has ever been submitted.
    pub id: Option<TaskId>,
    /// Current lifecycle status. `Idle` if no Task has been submitted yet.
    pub status: TaskStatus,
    /// Number of iterations executed so far.
    pub iterations_run: u32,
    /// Configured iteration cap.
    pub max_iterations: u32,
    /// Sub-calls consumed so far.
    pub sub_calls_used: u32,
    /// Configured sub-call cap.
    pub max_sub_calls: u32,
}

impl TaskState {
    /// The state of an engine with no Task ever submitted.
    pub fn idle() -> Self {
        Self { id: None, status: TaskStatus::Idle, iterations_run: 0, max_iterations: 0, sub_calls_used: 0, max_sub_calls: 0 }
    }
}

impl From<&Task> for TaskState {
    fn from(task: &Task) -> Self {
        Self {
            id: Some(task.id.clone()),
            status: task.status,
            iterations_run: task.iterations.len() as u32,
            max_iterations: task.max_iterations,
            sub_calls_used: task.sub_calls_used,
            max_sub_calls: task.max_sub_calls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_state_has_no_task_id() {
        let s = TaskState::idle();
        assert!(s.id.is_none());
        assert_eq!(s.status, TaskStatus::Idle);
    }

    #[test]
    fn state_reflects_a_live_task() {
        let t = Task::new(TaskId::new("t1"), "find the answer", 25, 50);
        let s = TaskState::from(&t);
        assert_eq!(s.id.unwrap().as_str(), "t1");
        assert_eq!(s.max_iterations, 25);
        assert_eq!(s.iterations_run, 0);
    }
}
