#![deny(missing_docs)]
//! The sandboxed JS REPL runtime (§4.2): capability-gated `rquickjs`
//! evaluator, declaration hoisting across iterations, result capping, and
//! the `EngineCallbacks` bridge back to whichever engine owns a REPL.
//!
//! This crate ships everything needed to stand up one REPL in isolation —
//! it does not know about `Task`s, iteration budgets, or the model — that
//! orchestration lives in `rlm-engine`, which holds one
//! [`sandbox::Sandbox`] per running Task (plus one more per in-flight
//! sub-agent call).

pub mod callbacks;
pub mod capability;
pub mod error;
pub mod hoist;
pub mod sandbox;

pub use callbacks::{EngineCallbacks, NullCallbacks, SubAgentCallbacks, SubCallOutcome};
pub use capability::{CapabilityRegistry, CAPABILITY_NAMES};
pub use error::ReplError;
pub use hoist::{hoist, predeclare_statement, HoistResult};
pub use sandbox::Sandbox;
