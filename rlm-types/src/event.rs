//! The typed, ordered event stream emitted to an observer (§4.9, §6).
//!
//! Events are delivered in program order. Exactly one [`EngineEvent::Complete`]
//! is emitted per Task, and it is always last.

use serde::{Deserialize, Serialize};

use crate::task::{PageChange, TabField};

/// One event on the engine's observer-facing stream.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EngineEvent {
    /// A new iteration has begun.
    IterationStart {
        /// 1-based iteration index.
        iteration: u32,
        /// The task's original goal, echoed for the observer.
        task_goal: String,
    },
    /// One streamed token of the model's response.
    StreamToken {
        /// The token text.
        token: String,
        /// Which iteration this token belongs to.
        iteration: u32,
    },
    /// A code block was extracted from the model's response and is about to run.
    CodeGenerated {
        /// The verbatim code.
        code: String,
        /// 0-based index within the iteration.
        block_index: u32,
    },
    /// A code block finished executing.
    CodeResult {
        /// Structural summary of the result.
        metadata: String,
        /// 0-based index within the iteration.
        block_index: u32,
        /// Present if execution captured an error.
        error: Option<String>,
    },
    /// A sub-agent invocation began.
    SubLlmStart {
        /// The sub-task prompt, truncated to 200 characters.
        prompt: String,
        /// Index of this sub-call within the Task.
        sub_call_index: u32,
    },
    /// A sub-agent invocation finished.
    SubLlmComplete {
        /// Structural summary of the sub-agent's result.
        result_meta: String,
        /// Index of this sub-call within the Task.
        sub_call_index: u32,
    },
    /// One or more tabs changed since the last snapshot.
    PageChanges {
        /// The changed fields.
        changes: Vec<PageChange>,
    },
    /// REPL environment/variable metadata changed.
    EnvUpdate {
        /// JSON-encoded descriptor metadata.
        metadata: String,
    },
    /// A `log()` call from inside the REPL.
    Log {
        /// The logged message, capped to 5,000 characters.
        message: String,
    },
    /// An unrecoverable engine-level error occurred.
    Error {
        /// Human-readable error description.
        error: String,
    },
    /// Terminal event. Emitted exactly once per Task, always last.
    Complete {
        /// The final value, or `None` on error/cancellation.
        #[serde(rename = "final")]
        final_value: Option<serde_json::Value>,
    },
}

impl EngineEvent {
    /// Build the `complete{final: "Task cancelled by user."}` event.
    pub fn cancelled() -> Self {
        EngineEvent::Complete {
            final_value: Some(serde_json::Value::String("Task cancelled by user.".into())),
        }
    }

    /// Build the `complete{final: "Reached maximum iterations (N)..."}` event.
    pub fn iteration_cap_reached(max_iterations: u32) -> Self {
        EngineEvent::Complete {
            final_value: Some(serde_json::Value::String(format!(
                "Reached maximum iterations ({max_iterations}). Partial results may be available."
            ))),
        }
    }

    /// Build the terminal `complete{final: null}` event used after an error.
    pub fn complete_null() -> Self {
        EngineEvent::Complete { final_value: None }
    }

    /// True if this is the terminal event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineEvent::Complete { .. })
    }
}

impl From<TabField> for &'static str {
    fn from(f: TabField) -> Self {
        match f {
            TabField::Url => "url",
            TabField::Title => "title",
            TabField::Status => "status",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_event_carries_the_cancellation_message() {
        let ev = EngineEvent::cancelled();
        match ev {
            EngineEvent::Complete { final_value } => {
                assert_eq!(final_value, Some(serde_json::json!("Task cancelled by user.")));
            }
            _ => panic!("expected Complete"),
        }
    }

    #[test]
    fn iteration_cap_message_embeds_the_configured_cap() {
        let ev = EngineEvent::iteration_cap_reached(25);
        match ev {
            EngineEvent::Complete { final_value } => {
                let s = final_value.unwrap();
                assert!(s.as_str().unwrap().contains("maximum iterations (25)"));
            }
            _ => panic!("expected Complete"),
        }
    }

    #[test]
    fn only_complete_is_terminal() {
        assert!(EngineEvent::complete_null().is_terminal());
        assert!(!EngineEvent::Log { message: "hi".into() }.is_terminal());
    }

    #[test]
    fn serializes_with_kebab_case_tag() {
        let ev = EngineEvent::IterationStart { iteration: 1, task_goal: "hi".into() };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], serde_json::json!("iteration-start"));
    }
}
