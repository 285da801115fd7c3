#![deny(missing_docs)]
//! Consumed-contract traits the engine depends on but does not implement:
//! the browser driver (§6) and the model client facade (§4.8).
//!
//! Both are "contract only" per §1 — concrete network transports and the
//! `exec_in_tab` primitive are external collaborators. This crate also
//! ships scripted in-memory test doubles for both traits.

pub mod browser;
pub mod model;

pub use browser::{BrowserDriver, DriverError, ScriptedBrowserDriver, TabInfo};
pub use model::{Message, ModelClient, ModelError, Role, ScriptedModelClient};
