#![deny(missing_docs)]
//! Shared vocabulary for the RLM execution engine.
//!
//! This crate holds no behavior — only the data model (§3), the event
//! stream's wire types (§6), and the configuration/error surfaces that
//! every other `rlm-*` crate depends on. Splitting it out keeps
//! `rlm-repl`, `rlm-context`, and `rlm-engine` free of a dependency cycle.

pub mod config;
pub mod duration;
pub mod error;
pub mod event;
pub mod id;
pub mod task;
pub mod value;

pub use config::{EngineConfig, ProviderKind, SecretString};
pub use duration::DurationMs;
pub use error::EngineError;
pub use event::EngineEvent;
pub use id::{SubCallId, TaskId};
pub use task::{BlockResult, IterationRecord, PageChange, Snapshot, TabField, TabState, Task, TaskStatus};
pub use value::{ReplValue, ValueDescriptor};
