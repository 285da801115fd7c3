//! Engine-level error taxonomy.
//!
//! Per §7.1, `EngineError` is only ever the `Err` of `submit_task` for a
//! *pre-flight* configuration failure. Every mid-run failure category is
//! expressed through `EngineEvent::Error`/`EngineEvent::Complete`, never
//! through a Rust `Result::Err` — the loop's `run()` returns `Ok(())`
//! even when the Task itself ends in `TaskStatus::Error`.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can be returned directly from the engine's public surface.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EngineError {
    /// The configuration failed validation before any Task could start.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// `submit_task` was called while a Task was already `Running`.
    #[error("a task is already running")]
    TaskBusy,

    /// `cancel`/`confirmation_response` was called with no active Task.
    #[error("no task is currently running")]
    NoActiveTask,

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_busy_displays_clearly() {
        assert_eq!(EngineError::TaskBusy.to_string(), "a task is already running");
    }

    #[test]
    fn config_error_wraps_and_displays() {
        let ce = ConfigError::MissingField { field: "api_key" };
        let ee: EngineError = ce.into();
        assert!(ee.to_string().contains("api_key"));
    }
}
