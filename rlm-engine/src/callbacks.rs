//! `ControllerCallbacks`: the `EngineCallbacks` implementation the main
//! agent's `Sandbox` is built with — the concrete other side of the
//! cyclic-ownership break `rlm-repl::EngineCallbacks` exists for.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio_util::sync::CancellationToken;

use rlm_driver::browser::BrowserDriver;
use rlm_driver::model::ModelClient;
use rlm_repl::{EngineCallbacks, SubCallOutcome};
use rlm_types::value::ReplValue;
use rlm_types::{EngineConfig, EngineEvent, Task};

use crate::sub_agent;
use crate::util::truncate_chars;

/// Event previews of a sub-call's prompt are capped at 200 characters (§6).
const SUB_CALL_PROMPT_PREVIEW_CHARS: usize = 200;

/// Bridges a REPL back into the owning Controller: sub-agent spawns consume
/// the shared sub-call budget and fan out through [`sub_agent::run`];
/// `log()` forwards straight onto the Event Bus.
pub struct ControllerCallbacks<M: ModelClient + 'static> {
    pub(crate) config: EngineConfig,
    pub(crate) model: Arc<M>,
    pub(crate) driver: Arc<dyn BrowserDriver>,
    pub(crate) task: Arc<TokioMutex<Task>>,
    pub(crate) events: mpsc::UnboundedSender<EngineEvent>,
    pub(crate) cancel: CancellationToken,
}

impl<M: ModelClient + 'static> ControllerCallbacks<M> {
    /// Atomically check the shared sub-call budget and reserve one slot,
    /// returning this sub-call's 1-based index within the Task if granted.
    async fn reserve_sub_call(&self) -> Option<u32> {
        let mut task = self.task.lock().await;
        if !task.has_sub_call_budget() {
            return None;
        }
        task.sub_calls_used += 1;
        Some(task.sub_calls_used)
    }
}

#[async_trait]
impl<M: ModelClient + 'static> EngineCallbacks for ControllerCallbacks<M> {
    async fn on_log(&self, message: &str) {
        let _ = self.events.send(EngineEvent::Log { message: message.to_string() });
    }

    async fn on_set_final(&self, _value: &ReplValue) {
        // The main loop polls `Sandbox::take_final()` itself after every
        // executed block (§4.1 step 8); nothing else reacts to this hook.
    }

    async fn on_sub_call(&self, prompt: &str, data: Option<ReplValue>) -> String {
        let Some(index) = self.reserve_sub_call().await else {
            return "[SUB-CALL ERROR] Maximum sub-call limit reached.".to_string();
        };

        let _ = self.events.send(EngineEvent::SubLlmStart {
            prompt: truncate_chars(prompt, SUB_CALL_PROMPT_PREVIEW_CHARS),
            sub_call_index: index,
        });

        let result =
            sub_agent::run(&self.config, &self.model, &self.driver, &self.task, &self.cancel, &self.events, prompt, data).await;

        let _ = self.events.send(EngineEvent::SubLlmComplete {
            result_meta: truncate_chars(&result, rlm_types::config::PREVIEW_MAX_CHARS),
            sub_call_index: index,
        });

        result
    }

    async fn on_sub_batch(&self, prompts: Vec<String>) -> Vec<SubCallOutcome> {
        let futures = prompts.into_iter().map(|p| async move {
            let result = self.on_sub_call(&p, None).await;
            if result.starts_with("[SUB-CALL ERROR]") || result.starts_with("[SUB-CALL CANCELLED]") {
                SubCallOutcome::Rejected(result)
            } else {
                SubCallOutcome::Fulfilled(result)
            }
        });
        futures::future::join_all(futures).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rlm_driver::browser::ScriptedBrowserDriver;
    use rlm_driver::model::ScriptedModelClient;
    use rlm_types::{ProviderKind, SecretString, Task, TaskId};

    fn config() -> EngineConfig {
        EngineConfig {
            provider: ProviderKind::AnthropicStyle,
            api_key: SecretString::new("sk-test"),
            base_url: None,
            primary_model: "claude-sonnet-4-20250514".into(),
            sub_model: None,
            max_iterations: 25,
            max_sub_calls: 1,
        }
    }

    fn callbacks(responses: Vec<Result<String, rlm_driver::model::ModelError>>) -> (ControllerCallbacks<ScriptedModelClient>, Arc<TokioMutex<Task>>) {
        let task = Arc::new(TokioMutex::new(Task::new(TaskId::new("t1"), "parent goal", 25, 1)));
        let driver: Arc<dyn BrowserDriver> = Arc::new(ScriptedBrowserDriver::new("https://example.com", vec![]));
        let (tx, _rx) = mpsc::unbounded_channel();
        let cb = ControllerCallbacks {
            config: config(),
            model: Arc::new(ScriptedModelClient::new(responses)),
            driver,
            task: Arc::clone(&task),
            events: tx,
            cancel: CancellationToken::new(),
        };
        (cb, task)
    }

    #[tokio::test]
    async fn sub_call_budget_exhaustion_returns_the_literal_sentinel() {
        let (cb, task) = callbacks(vec![Ok("```repl\nsetFinal(1)\n```".to_string())]);
        task.lock().await.sub_calls_used = 1;

        let result = cb.on_sub_call("anything", None).await;
        assert_eq!(result, "[SUB-CALL ERROR] Maximum sub-call limit reached.");
    }

    #[tokio::test]
    async fn a_granted_sub_call_consumes_one_unit_of_budget() {
        let (cb, task) = callbacks(vec![Ok("```repl\nsetFinal(\"ok\")\n```".to_string())]);
        let result = cb.on_sub_call("anything", None).await;
        assert_eq!(result, "\"ok\"");
        assert_eq!(task.lock().await.sub_calls_used, 1);
    }

    #[tokio::test]
    async fn sub_batch_reports_mixed_success_and_rejection_independently() {
        let (cb, task) = callbacks(vec![Ok("```repl\nsetFinal(\"first\")\n```".to_string())]);
        // Budget is 1: the first resolved sub-call consumes it, so whichever
        // of the two batch entries runs second is rejected for budget
        // exhaustion rather than failing outright.
        let outcomes = cb.on_sub_batch(vec!["one".to_string(), "two".to_string()]).await;
        assert_eq!(outcomes.len(), 2);
        let fulfilled = outcomes.iter().filter(|o| matches!(o, SubCallOutcome::Fulfilled(_))).count();
        let rejected = outcomes.iter().filter(|o| matches!(o, SubCallOutcome::Rejected(_))).count();
        assert_eq!(fulfilled, 1);
        assert_eq!(rejected, 1);
        assert_eq!(task.lock().await.sub_calls_used, 1);
    }
}
