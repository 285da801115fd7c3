//! The sub-agent mini-RLM loop (§4.1, "Sub-agent recursion"): an
//! independent REPL and conversation history, capped at
//! [`MAX_SUB_ITERATIONS`], sharing the parent Task's sub-call budget and
//! cancellation signal but not its iteration history.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio_util::sync::CancellationToken;

use rlm_context::{context_builder, sub_agent_progress_summary};
use rlm_driver::browser::BrowserDriver;
use rlm_driver::model::{Message, ModelClient};
use rlm_repl::{EngineCallbacks, Sandbox, SubAgentCallbacks, SubCallOutcome};
use rlm_types::config::MAX_SUB_ITERATIONS;
use rlm_types::value::ReplValue;
use rlm_types::{EngineConfig, EngineEvent, Task};

const CONSECUTIVE_TRANSIENT_ERROR_LIMIT: u32 = 3;
const CONSECUTIVE_NO_CODE_LIMIT: u32 = 3;

/// The `EngineCallbacks` a sub-agent's own REPL is given directly (before
/// being wrapped in [`SubAgentCallbacks`], which is what actually disables
/// `llm_query`/`llm_batch`): `log()` still needs to reach the Event Bus.
struct EventForwardingCallbacks {
    events: mpsc::UnboundedSender<EngineEvent>,
}

#[async_trait]
impl EngineCallbacks for EventForwardingCallbacks {
    async fn on_log(&self, message: &str) {
        let _ = self.events.send(EngineEvent::Log { message: message.to_string() });
    }

    async fn on_set_final(&self, _value: &ReplValue) {
        // The mini-loop below polls `Sandbox::take_final()` itself after
        // every executed block; nothing else needs to react to this hook.
    }

    async fn on_sub_call(&self, _prompt: &str, _data: Option<ReplValue>) -> String {
        "[SUB-CALL ERROR] Recursion is disabled in sub-agent REPLs.".to_string()
    }

    async fn on_sub_batch(&self, prompts: Vec<String>) -> Vec<SubCallOutcome> {
        prompts.iter().map(|_| SubCallOutcome::Rejected("Recursion is disabled in sub-agent REPLs.".into())).collect()
    }
}

async fn close_tabs_opened_since<D: BrowserDriver + ?Sized>(driver: &D, pre_existing: &HashSet<String>) {
    if let Ok(tabs) = driver.list_tabs().await {
        for tab in tabs {
            if !pre_existing.contains(&tab.id) {
                let _ = driver.close_tab(&tab.id).await;
            }
        }
    }
}

/// Run one sub-agent to completion and return its stringified result, or a
/// `[SUB-CALL ERROR]`/`[SUB-CALL CANCELLED]` sentinel. Never panics and
/// never propagates a `Result::Err` — every failure mode here is a string
/// sentinel handed back to the caller's REPL (§4.1, §7).
///
/// The sub-call budget itself has already been reserved by the caller
/// (`ControllerCallbacks::on_sub_call`) before this runs.
#[allow(clippy::too_many_arguments)]
pub async fn run<M: ModelClient + 'static>(
    config: &EngineConfig,
    model: &Arc<M>,
    driver: &Arc<dyn BrowserDriver>,
    task: &Arc<TokioMutex<Task>>,
    cancel: &CancellationToken,
    events: &mpsc::UnboundedSender<EngineEvent>,
    prompt: &str,
    data: Option<ReplValue>,
) -> String {
    if cancel.is_cancelled() {
        return "[SUB-CALL CANCELLED]".to_string();
    }

    let (task_message, progress) = {
        let t = task.lock().await;
        (t.message.clone(), sub_agent_progress_summary(&t.iterations))
    };

    let pre_existing: HashSet<String> = driver.list_tabs().await.map(|tabs| tabs.into_iter().map(|t| t.id).collect()).unwrap_or_default();

    let callbacks = Arc::new(SubAgentCallbacks::new(EventForwardingCallbacks { events: events.clone() }));
    let sandbox = match Sandbox::new(Arc::clone(driver), callbacks).await {
        Ok(s) => s,
        Err(e) => return format!("[SUB-CALL ERROR] failed to start sub-agent REPL: {e}"),
    };

    if let Some(value) = &data {
        let json = serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
        sandbox.execute(&format!("var __data = {json};")).await;
    }

    let system_base = format!(
        "{}\n\nParent task: {task_message}\nParent progress so far: {progress}",
        context_builder::sub_agent_system_prompt()
    );
    let mut messages = vec![Message::user(prompt.to_string())];
    let model_name = config.effective_sub_model().to_string();

    let mut consecutive_transient_errors = 0u32;
    let mut consecutive_no_code = 0u32;

    for iteration in 1..=MAX_SUB_ITERATIONS {
        if cancel.is_cancelled() {
            close_tabs_opened_since(driver.as_ref(), &pre_existing).await;
            return "[SUB-CALL CANCELLED]".to_string();
        }

        let mut system = system_base.clone();
        if iteration + 1 >= MAX_SUB_ITERATIONS {
            system.push_str("\n\nThis is one of your final two iterations. Call setFinal(value) now with your best answer.");
        }

        let response = match model.complete(&system, &messages, &model_name, cancel).await {
            Ok(text) => {
                consecutive_transient_errors = 0;
                text
            }
            Err(e) if e.is_retryable() => {
                consecutive_transient_errors += 1;
                if consecutive_transient_errors >= CONSECUTIVE_TRANSIENT_ERROR_LIMIT {
                    close_tabs_opened_since(driver.as_ref(), &pre_existing).await;
                    return format!("[SUB-CALL ERROR] model failed {CONSECUTIVE_TRANSIENT_ERROR_LIMIT} consecutive times: {e}");
                }
                messages.push(Message::user(format!("Previous attempt failed transiently ({e}); please try again.")));
                continue;
            }
            Err(e) => {
                close_tabs_opened_since(driver.as_ref(), &pre_existing).await;
                return format!("[SUB-CALL ERROR] model request failed: {e}");
            }
        };
        messages.push(Message::assistant(response.clone()));

        let blocks = rlm_extract::extract_blocks(&response);
        if blocks.is_empty() {
            consecutive_no_code += 1;
            if consecutive_no_code >= CONSECUTIVE_NO_CODE_LIMIT {
                close_tabs_opened_since(driver.as_ref(), &pre_existing).await;
                return response;
            }
            messages.push(Message::user(
                "No executable code block found. Respond with a ```repl code block, or call setFinal(value) if you already know the answer.".to_string(),
            ));
            continue;
        }
        consecutive_no_code = 0;

        let mut final_value = None;
        for code in &blocks {
            sandbox.execute(code).await;
            if let Some(v) = sandbox.take_final() {
                final_value = Some(v);
                break;
            }
            if cancel.is_cancelled() {
                break;
            }
        }

        if cancel.is_cancelled() && final_value.is_none() {
            close_tabs_opened_since(driver.as_ref(), &pre_existing).await;
            return "[SUB-CALL CANCELLED]".to_string();
        }

        if let Some(v) = final_value {
            close_tabs_opened_since(driver.as_ref(), &pre_existing).await;
            return serde_json::to_string(&v).unwrap_or_else(|_| v.to_string());
        }
    }

    close_tabs_opened_since(driver.as_ref(), &pre_existing).await;
    format!("[SUB-CALL ERROR] Sub-agent reached {MAX_SUB_ITERATIONS} iterations without calling setFinal()")
}
