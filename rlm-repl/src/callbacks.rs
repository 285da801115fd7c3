//! `EngineCallbacks` — the cyclic-ownership break (DESIGN NOTES §9).
//!
//! The loop controller owns each REPL for its lifecycle, but the REPL
//! must call back into the controller for sub-agent spawns and for
//! forwarding `log()`/`setFinal()` calls onto the Event Bus. Modeling
//! this as a callback handle the REPL holds (rather than the REPL
//! holding a reference to the controller itself) breaks the cycle and
//! keeps the REPL trivially mockable in isolation.

use async_trait::async_trait;
use rlm_types::value::ReplValue;

/// Outcome of one `llm_batch` element, mirroring JS `Promise.allSettled`.
#[derive(Debug, Clone)]
pub enum SubCallOutcome {
    /// The sub-agent call completed and produced a value.
    Fulfilled(String),
    /// The sub-agent call failed; one failure never cancels its peers.
    Rejected(String),
}

/// The callback surface a REPL holds to reach back into the engine that
/// owns it, without holding the engine itself.
#[async_trait]
pub trait EngineCallbacks: Send + Sync {
    /// Forward a `log(msg)` call onto the Event Bus as `EngineEvent::Log`.
    /// `msg` has already been capped to `LOG_MAX_CHARS` by the caller.
    async fn on_log(&self, message: &str);

    /// Forward a `setFinal(value)` call so the engine can emit
    /// `EngineEvent::Complete` once the current iteration finishes
    /// executing its remaining blocks (§4.1 step 8: "stop executing
    /// further blocks", not "stop immediately").
    async fn on_set_final(&self, value: &ReplValue);

    /// Run one sub-agent mini-RLM loop to completion and return its
    /// stringified result, or the `[SUB-CALL ERROR] ...` sentinel. Never
    /// returns an `Err` — all sub-call failure modes are string sentinels
    /// by design (§4.1, §7).
    async fn on_sub_call(&self, prompt: &str, data: Option<ReplValue>) -> String;

    /// Run `prompts.len()` sub-agent loops concurrently with allSettled
    /// semantics: every element resolves, regardless of whether its
    /// sibling sub-calls failed.
    async fn on_sub_batch(&self, prompts: Vec<String>) -> Vec<SubCallOutcome>;
}

/// A no-op `EngineCallbacks` for unit tests that don't exercise recursion.
#[derive(Default)]
pub struct NullCallbacks;

#[async_trait]
impl EngineCallbacks for NullCallbacks {
    async fn on_log(&self, _message: &str) {}
    async fn on_set_final(&self, _value: &ReplValue) {}
    async fn on_sub_call(&self, _prompt: &str, _data: Option<ReplValue>) -> String {
        "[SUB-CALL ERROR] recursion disabled".to_string()
    }
    async fn on_sub_batch(&self, prompts: Vec<String>) -> Vec<SubCallOutcome> {
        prompts.iter().map(|_| SubCallOutcome::Rejected("recursion disabled".into())).collect()
    }
}

/// The callbacks installed in a sub-agent's own REPL: `llm_query`/
/// `llm_batch` are disabled there (§4.1, "Sub-agent isolation" — a
/// sub-agent cannot spawn further sub-agents) but `log`/`setFinal`
/// still need to reach the parent's Event Bus forwarding.
pub struct SubAgentCallbacks<C: EngineCallbacks> {
    inner: C,
}

impl<C: EngineCallbacks> SubAgentCallbacks<C> {
    /// Wrap a parent's callbacks, disabling recursion.
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<C: EngineCallbacks> EngineCallbacks for SubAgentCallbacks<C> {
    async fn on_log(&self, message: &str) {
        self.inner.on_log(message).await;
    }

    async fn on_set_final(&self, value: &ReplValue) {
        self.inner.on_set_final(value).await;
    }

    async fn on_sub_call(&self, _prompt: &str, _data: Option<ReplValue>) -> String {
        "[SUB-CALL ERROR] Recursion is disabled in sub-agent REPLs.".to_string()
    }

    async fn on_sub_batch(&self, prompts: Vec<String>) -> Vec<SubCallOutcome> {
        prompts
            .iter()
            .map(|_| SubCallOutcome::Rejected("Recursion is disabled in sub-agent REPLs.".into()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_callbacks_returns_sub_call_error_sentinel() {
        let cb = NullCallbacks;
        let r = cb.on_sub_call("x", None).await;
        assert!(r.starts_with("[SUB-CALL ERROR]"));
    }

    #[tokio::test]
    async fn sub_agent_callbacks_disable_recursion_but_forward_log() {
        struct Counting(std::sync::atomic::AtomicUsize);
        #[async_trait]
        impl EngineCallbacks for Counting {
            async fn on_log(&self, _message: &str) {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
            async fn on_set_final(&self, _value: &ReplValue) {}
            async fn on_sub_call(&self, _p: &str, _d: Option<ReplValue>) -> String {
                "should not be reached".into()
            }
            async fn on_sub_batch(&self, _p: Vec<String>) -> Vec<SubCallOutcome> {
                vec![]
            }
        }

        let wrapped = SubAgentCallbacks::new(Counting(std::sync::atomic::AtomicUsize::new(0)));
        wrapped.on_log("hi").await;
        assert_eq!(wrapped.inner.0.load(std::sync::atomic::Ordering::SeqCst), 1);

        let r = wrapped.on_sub_call("x", None).await;
        assert!(r.starts_with("[SUB-CALL ERROR]"));
        assert!(wrapped.on_sub_batch(vec!["a".into()]).await.len() == 1);
    }
}
