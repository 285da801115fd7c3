#![deny(missing_docs)]
//! # rlm — umbrella crate
//!
//! Single import surface for the Recursive Language Model execution engine:
//! a bounded-iteration controller (`rlm-engine`) driving an LLM through a
//! sandboxed JS REPL (`rlm-repl`) whose external variables are live browser
//! tabs (`rlm-driver`), with metadata-only history (`rlm-context`) and
//! persisted key-value state across Tasks (`rlm-state`).
//!
//! Re-exports every crate below unconditionally — unlike the teacher's
//! `neuron` umbrella, nothing here is optional: there is exactly one engine,
//! one REPL runtime, and one state backend shape in this spec, not a set of
//! interchangeable provider/orchestrator implementations to feature-gate.

pub use rlm_context;
pub use rlm_driver;
pub use rlm_engine;
pub use rlm_extract;
pub use rlm_repl;
pub use rlm_state;
pub use rlm_types;

/// Happy-path imports for wiring up an engine.
pub mod prelude {
    pub use rlm_context::{build_user_turn, compact, describe, ContextInput, TabDiffTracker};
    pub use rlm_driver::browser::{BrowserDriver, DriverError, ScriptedBrowserDriver, TabInfo};
    pub use rlm_driver::model::{Message, ModelClient, ModelError, Role, ScriptedModelClient};
    pub use rlm_engine::{Engine, TaskState};
    pub use rlm_extract::extract_blocks;
    pub use rlm_repl::{EngineCallbacks, Sandbox};
    pub use rlm_state::{KvError, KvStore, MemoryKvStore};
    pub use rlm_types::config::{ProviderKind, SecretString};
    pub use rlm_types::{
        BlockResult, EngineConfig, EngineError, EngineEvent, IterationRecord, ReplValue, Task,
        TaskId, TaskStatus, ValueDescriptor,
    };
}

use rlm_types::config::{DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_SUB_CALLS};
use rlm_types::{EngineConfig, ProviderKind, SecretString};

/// Build an [`EngineConfig`] at the documented defaults (§6): `max_iterations`
/// 25, `max_sub_calls` 50, no `base_url` override, `sub_model` unset (so the
/// primary model is reused for sub-agent calls too). Still needs `validate()`
/// before being handed to [`rlm_engine::Engine::new`] — this helper does not
/// skip that check, it only saves re-typing the two cap defaults at every
/// call site.
pub fn default_config(provider: ProviderKind, api_key: SecretString, primary_model: impl Into<String>) -> EngineConfig {
    EngineConfig {
        provider,
        api_key,
        base_url: None,
        primary_model: primary_model.into(),
        sub_model: None,
        max_iterations: DEFAULT_MAX_ITERATIONS,
        max_sub_calls: DEFAULT_MAX_SUB_CALLS,
    }
}
