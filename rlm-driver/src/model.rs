//! The Model Client contract (consumed, §6, §4.8) — contract only.
//!
//! Mirrors the teacher corpus's `Provider` trait: deliberately non-dyn via
//! RPITIT (`impl Future<...> + Send`), so a streamed token never has to be
//! boxed. The loop controller holds its `ModelClient` behind a generic type
//! parameter, not a trait object — the object-safety boundary is pushed up
//! to `rlm-engine`'s own public API instead.
//!
//! No concrete HTTP provider lives here (§1: network transports to
//! particular model providers are out of scope). Only the trait, the error
//! taxonomy, and a scripted test double.

use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Who authored one message in a completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// A message from the user/engine.
    User,
    /// A message from the model.
    Assistant,
}

/// One alternating-turn message in a completion request.
#[derive(Debug, Clone)]
pub struct Message {
    /// Who authored this turn.
    pub role: Role,
    /// The turn's text content.
    pub content: String,
}

impl Message {
    /// Construct a user-authored message.
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    /// Construct an assistant-authored message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Errors from a `ModelClient` implementation.
///
/// Shaped like the teacher corpus's provider-error taxonomy so the
/// retry/cancellation logic built against it carries over unchanged.
#[non_exhaustive]
#[derive(Debug, Error, Clone)]
pub enum ModelError {
    /// The request failed at the transport layer (connection reset, etc.).
    #[error("request failed: {0}")]
    RequestFailed(String),
    /// The provider responded with a rate-limit signal.
    #[error("rate limited")]
    RateLimited,
    /// The configured API key was rejected.
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    /// The provider's response could not be parsed.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// The in-flight request was cancelled.
    #[error("cancelled")]
    Cancelled,
}

impl ModelError {
    /// Whether a sub-agent retry loop (§4.1) should consume one of its
    /// three attempts retrying this error. `Cancelled` is never retryable —
    /// it means the Task itself is being torn down.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ModelError::RateLimited | ModelError::RequestFailed(_))
    }
}

/// Narrow contract for a language-model backend: streaming and
/// non-streaming single-shot completion. Two thin adapters (one per
/// provider shape named in `ProviderKind`) would implement this in an
/// embedding application; none is implemented here.
pub trait ModelClient: Send + Sync {
    /// Stream a completion, invoking `on_token` once per token as it
    /// arrives, and returning the fully concatenated text. Must observe
    /// `cancel` between tokens and abort the underlying stream if it fires.
    fn stream(
        &self,
        system: &str,
        messages: &[Message],
        model: &str,
        on_token: &mut (dyn FnMut(&str) + Send),
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<String, ModelError>> + Send;

    /// Non-streaming single-shot completion.
    fn complete(
        &self,
        system: &str,
        messages: &[Message],
        model: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<String, ModelError>> + Send;
}

/// A scripted `ModelClient` for tests: hands out pre-programmed responses
/// in call order, optionally simulating transient failures.
pub struct ScriptedModelClient {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<String, ModelError>>>,
    call_count: std::sync::atomic::AtomicUsize,
}

impl ScriptedModelClient {
    /// Build a client that returns `responses` in order, then
    /// `ModelError::InvalidResponse` once exhausted.
    pub fn new(responses: Vec<Result<String, ModelError>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
            call_count: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Number of `stream`/`complete` calls made so far.
    pub fn call_count(&self) -> usize {
        self.call_count.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn next_response(&self) -> Result<String, ModelError> {
        self.call_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::InvalidResponse("script exhausted".into())))
    }
}

impl ModelClient for ScriptedModelClient {
    async fn stream(
        &self,
        _system: &str,
        _messages: &[Message],
        _model: &str,
        on_token: &mut (dyn FnMut(&str) + Send),
        cancel: &CancellationToken,
    ) -> Result<String, ModelError> {
        if cancel.is_cancelled() {
            return Err(ModelError::Cancelled);
        }
        let text = self.next_response()?;
        for word in text.split_inclusive(' ') {
            if cancel.is_cancelled() {
                return Err(ModelError::Cancelled);
            }
            on_token(word);
        }
        Ok(text)
    }

    async fn complete(
        &self,
        _system: &str,
        _messages: &[Message],
        _model: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ModelError> {
        if cancel.is_cancelled() {
            return Err(ModelError::Cancelled);
        }
        self.next_response()
    }
}
