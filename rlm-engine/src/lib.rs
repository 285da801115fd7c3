#![deny(missing_docs)]
//! The Loop Controller (§4.1): the main-agent and sub-agent iteration state
//! machines, cancellation wiring, and the public `submit_task`/`cancel`/
//! `get_state`/`confirmation_response` engine surface (§6).
//!
//! Every other `rlm-*` crate is a component this one orchestrates: `rlm-repl`
//! runs code, `rlm-context` turns accumulated state into the next prompt,
//! `rlm-extract` pulls code blocks out of model text, `rlm-driver` supplies
//! the browser/model contracts. This crate owns none of their internals —
//! it drives them.
//!
//! Grounded on `_teacher_ref/neuron-op-react/src/lib.rs`'s `ReactOperator`:
//! the same per-turn shape (ask for the next message, call the model, act on
//! what comes back, check limits, repeat) generalized from tool calls to
//! REPL code blocks and from hook dispatch to typed event emission.

mod callbacks;
mod controller;
mod engine;
mod state;
mod sub_agent;
mod util;

pub use engine::Engine;
pub use state::TaskState;
