//! Errors internal to the REPL runtime's own boundary.

use thiserror::Error;

/// Errors from REPL construction or host-function dispatch.
///
/// Note this is distinct from the `{__rlm_error}` sentinel (§4.2 step 5):
/// a `ReplError` means the *host* failed to run the capability bridge at
/// all (a bug in this crate, or the underlying driver being unreachable);
/// an `{__rlm_error}` sentinel means the *user's JS threw*, which is
/// captured and never surfaced as a `ReplError`.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ReplError {
    /// The requested capability name has no registered handler.
    #[error("unknown capability: {0}")]
    UnknownCapability(String),
    /// The arguments passed to a capability did not match its expected shape.
    #[error("invalid arguments for {capability}: {message}")]
    InvalidArguments {
        /// The capability name.
        capability: String,
        /// What was wrong with the arguments.
        message: String,
    },
    /// The underlying browser driver returned an error.
    #[error("driver error: {0}")]
    Driver(#[from] rlm_driver::DriverError),
    /// A value failed to cross the Rust/JS boundary.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Evaluation exceeded its wall-clock timeout.
    #[error("execution timed out after {0}ms")]
    Timeout(u64),
    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}
