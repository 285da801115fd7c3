//! Engine configuration (§6, "recognized options") and its validation.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use thiserror::Error;

/// Bound on `max_iterations`.
pub const MAX_ITERATIONS_BOUND: RangeInclusive<u32> = 1..=100;
/// Bound on `max_sub_calls`.
pub const MAX_SUB_CALLS_BOUND: RangeInclusive<u32> = 1..=200;

/// Default `max_iterations` when not configured.
pub const DEFAULT_MAX_ITERATIONS: u32 = 25;
/// Default `max_sub_calls` when not configured.
pub const DEFAULT_MAX_SUB_CALLS: u32 = 50;

/// Fixed internal caps the engine never exposes for reconfiguration.
pub const MAX_NO_CODE_CONTINUATIONS: u32 = 3;
/// Sub-agent iteration cap (MAX_SUB_ITERATIONS).
pub const MAX_SUB_ITERATIONS: u32 = 10;
/// Token budget for the compacted history text.
pub const HISTORY_TOKEN_BUDGET: u64 = 8_000;
/// Fraction of [`HISTORY_TOKEN_BUDGET`] at which compaction triggers.
pub const HISTORY_COMPACT_THRESHOLD: f64 = 0.8;
/// Hard cap, in characters, on a JSON-serialized executed-block result.
pub const EXEC_RESULT_CAP: usize = 100_000;
/// Hard cap, in milliseconds, on a `sleep()` call.
pub const SLEEP_CAP_MS: u64 = 10_000;
/// Wall-clock timeout for one code block's execution.
pub const EXEC_TIMEOUT_MS: u64 = 30_000;
/// Wall-clock timeout for one `execInTab` call.
pub const EXEC_IN_TAB_TIMEOUT_MS: u64 = 10_000;
/// Default wall-clock timeout for one `waitForLoad`/`waitForSelector` call
/// when the caller omits `timeoutMs`. Distinct from and longer than
/// [`EXEC_IN_TAB_TIMEOUT_MS`] — page loads and selector waits routinely
/// outlast a plain `execInTab` round trip.
pub const WAIT_TIMEOUT_MS: u64 = 30_000;
/// Hard cap, in characters, on a `log()` message.
pub const LOG_MAX_CHARS: usize = 5_000;
/// Preview length used for most metadata previews.
pub const PREVIEW_MAX_CHARS: usize = 400;
/// Preview length used specifically for REPL variable descriptors.
pub const VAR_PREVIEW_MAX_CHARS: usize = 200;
/// Per-REPL memory cap, in bytes (128 MiB).
pub const ISOLATE_MEMORY_LIMIT_BYTES: u64 = 128 * 1024 * 1024;

/// Which model-provider shape a [`crate::EngineConfig`] targets.
///
/// This selects which thin adapter the embedder should instantiate behind
/// the `ModelClient` trait (`rlm-driver`); this crate does not implement
/// either adapter itself (§1: network transports are out of scope).
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Anthropic Messages-API-shaped request/response.
    AnthropicStyle,
    /// OpenAI-compatible chat-completions-shaped request/response.
    OpenAiCompatible,
}

/// A secret value whose `Debug` output never prints the value itself.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the secret value. Named loudly so call sites are greppable.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<redacted>")
    }
}

/// The engine's recognized configuration options (§6).
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Which provider shape `api_key`/`base_url` are interpreted against.
    pub provider: ProviderKind,
    /// API key for the configured provider. Never logged.
    pub api_key: SecretString,
    /// Override for the provider's default API base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Model identifier used by the main agent loop.
    pub primary_model: String,
    /// Model identifier used by sub-agent loops. Defaults to `primary_model` if unset.
    #[serde(default)]
    pub sub_model: Option<String>,
    /// Hard cap on main-loop iterations. Bound `[1, 100]`.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Hard cap on sub-calls, shared across the whole Task. Bound `[1, 200]`.
    #[serde(default = "default_max_sub_calls")]
    pub max_sub_calls: u32,
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

fn default_max_sub_calls() -> u32 {
    DEFAULT_MAX_SUB_CALLS
}

impl EngineConfig {
    /// Resolve the model used for sub-agent loops: `sub_model` if set, else `primary_model`.
    pub fn effective_sub_model(&self) -> &str {
        self.sub_model.as_deref().unwrap_or(&self.primary_model)
    }

    /// Validate the configured bounds. Does not validate the API key or model
    /// names — those failures surface later as `ModelError`s from the facade.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !MAX_ITERATIONS_BOUND.contains(&self.max_iterations) {
            return Err(ConfigError::OutOfBounds {
                field: "max_iterations",
                value: self.max_iterations as i64,
                bound: format!("{:?}", MAX_ITERATIONS_BOUND),
            });
        }
        if !MAX_SUB_CALLS_BOUND.contains(&self.max_sub_calls) {
            return Err(ConfigError::OutOfBounds {
                field: "max_sub_calls",
                value: self.max_sub_calls as i64,
                bound: format!("{:?}", MAX_SUB_CALLS_BOUND),
            });
        }
        if self.primary_model.trim().is_empty() {
            return Err(ConfigError::MissingField { field: "primary_model" });
        }
        if self.api_key.expose_secret().trim().is_empty() {
            return Err(ConfigError::MissingField { field: "api_key" });
        }
        Ok(())
    }
}

/// Errors from validating an [`EngineConfig`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric field fell outside its documented bound.
    #[error("{field} = {value} is out of bounds {bound}")]
    OutOfBounds {
        /// The offending field name.
        field: &'static str,
        /// The configured value.
        value: i64,
        /// The documented bound, rendered for display.
        bound: String,
    },
    /// A required field was empty or absent.
    #[error("missing required field: {field}")]
    MissingField {
        /// The offending field name.
        field: &'static str,
    },
    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}
