//! The main-agent iteration loop (§4.1's 13-step per-iteration algorithm),
//! grounded on `_teacher_ref/neuron-op-react/src/lib.rs`'s `ReactOperator::execute`
//! turn loop: ask for the next input, call the model, act on the response,
//! check limits, repeat. Tool calls there become REPL code blocks here;
//! hook dispatch there becomes typed `EngineEvent` emission here.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio_util::sync::CancellationToken;

use rlm_context::context_builder::render_descriptor;
use rlm_context::{compact, describe, reinforcement_block, synthesize_iteration, ContextInput, TabDiffTracker};
use rlm_driver::browser::BrowserDriver;
use rlm_driver::model::{Message, ModelClient, ModelError};
use rlm_repl::Sandbox;
use rlm_types::config::MAX_NO_CODE_CONTINUATIONS;
use rlm_types::{BlockResult, DurationMs, EngineConfig, EngineEvent, IterationRecord, Task, TaskId, TaskStatus};

use crate::callbacks::ControllerCallbacks;

/// Owns one running Task's main-agent loop: the persistent `Sandbox`,
/// conversation history, and tab-diff baseline, plus everything needed to
/// emit events and observe cancellation.
pub struct Controller<M: ModelClient + 'static> {
    pub(crate) config: EngineConfig,
    pub(crate) model: Arc<M>,
    pub(crate) driver: Arc<dyn BrowserDriver>,
    pub(crate) task: Arc<TokioMutex<Task>>,
    pub(crate) events: mpsc::UnboundedSender<EngineEvent>,
    pub(crate) cancel: CancellationToken,
}

fn elapsed_since(start: Instant, since: DurationMs) -> DurationMs {
    let now = DurationMs::from(start.elapsed());
    DurationMs::from_millis(now.as_millis().saturating_sub(since.as_millis()))
}

impl<M: ModelClient + 'static> Controller<M> {
    /// Drive the Task to completion: runs until `Complete`, `Cancelled`, or
    /// `Error`, emitting exactly one terminal `complete` event before
    /// returning. Never returns a `Result` — every failure mode here ends
    /// the Task, it does not propagate a Rust error (§7.1).
    pub async fn run(self) {
        let task_id = { self.task.lock().await.id.clone() };
        tracing::info!(task_id = %task_id, "task started");
        {
            self.task.lock().await.status = TaskStatus::Running;
        }

        let callbacks = Arc::new(ControllerCallbacks {
            config: self.config.clone(),
            model: Arc::clone(&self.model),
            driver: Arc::clone(&self.driver),
            task: Arc::clone(&self.task),
            events: self.events.clone(),
            cancel: self.cancel.clone(),
        });

        let sandbox = match Sandbox::new(Arc::clone(&self.driver), callbacks).await {
            Ok(s) => s,
            Err(e) => {
                self.finish_error(&task_id, &format!("failed to start REPL: {e}")).await;
                return;
            }
        };

        let mut tab_diff = TabDiffTracker::new();
        let mut messages: Vec<Message> = Vec::new();
        let mut consecutive_no_code = 0u32;
        let start = Instant::now();
        let system = rlm_context::main_system_prompt();
        let task_goal = { self.task.lock().await.message.clone() };

        loop {
            if self.cancel.is_cancelled() {
                tracing::debug!(task_id = %task_id, "cancellation observed at iteration start");
                self.finish_cancelled(&task_id).await;
                return;
            }

            let (iteration, max_iterations) = {
                let t = self.task.lock().await;
                (t.iterations.len() as u32 + 1, t.max_iterations)
            };
            tracing::debug!(task_id = %task_id, iteration, "iteration start");
            let _ = self.events.send(EngineEvent::IterationStart { iteration, task_goal: task_goal.clone() });
            let iter_started_at = DurationMs::from(start.elapsed());

            let pre_snapshot = self.driver.capture_snapshot().await.unwrap_or_default();
            let page_changes = tab_diff.diff(&pre_snapshot);
            if !page_changes.is_empty() {
                let _ = self.events.send(EngineEvent::PageChanges { changes: page_changes.clone() });
            }

            let (reinforcement, history_text) = {
                let t = self.task.lock().await;
                (reinforcement_block(&t.message, iteration, max_iterations, &t.iterations), compact(&t.iterations))
            };
            let tab_count = pre_snapshot.len();
            let active_tab_id = self.driver.active_tab_id().await.ok().flatten();
            let descriptors = self.describe_environment(&sandbox).await;
            if !descriptors.is_empty() {
                if let Ok(metadata) = serde_json::to_string(&descriptors) {
                    let _ = self.events.send(EngineEvent::EnvUpdate { metadata });
                }
            }

            let user_turn = rlm_context::build_user_turn(&ContextInput {
                reinforcement: &reinforcement,
                page_changes: &page_changes,
                tab_count,
                active_tab_id: active_tab_id.as_deref(),
                variable_descriptors: &descriptors,
                history_text: &history_text,
                iteration,
            });
            messages.push(Message::user(user_turn));

            let response_text = {
                let events = self.events.clone();
                let mut on_token = move |token: &str| {
                    let _ = events.send(EngineEvent::StreamToken { token: token.to_string(), iteration });
                };
                match self.model.stream(&system, &messages, &self.config.primary_model, &mut on_token, &self.cancel).await {
                    Ok(text) => text,
                    Err(ModelError::Cancelled) => {
                        self.finish_cancelled(&task_id).await;
                        return;
                    }
                    Err(e) => {
                        self.finish_error(&task_id, &format!("model request failed: {e}")).await;
                        return;
                    }
                }
            };
            messages.push(Message::assistant(response_text.clone()));

            if self.cancel.is_cancelled() {
                self.finish_cancelled(&task_id).await;
                return;
            }

            let blocks = rlm_extract::extract_blocks(&response_text);

            if blocks.is_empty() {
                consecutive_no_code += 1;
                if consecutive_no_code >= MAX_NO_CODE_CONTINUATIONS {
                    self.finish_error(&task_id, "model produced no executable code for 3 consecutive iterations").await;
                    return;
                }
                messages.push(Message::user(
                    "No executable code block found. Respond with a ```repl code block, or call setFinal(value) if the task is already complete.".to_string(),
                ));
                let record = IterationRecord {
                    index: iteration,
                    started_at: iter_started_at,
                    duration: elapsed_since(start, iter_started_at),
                    blocks: vec![],
                    one_liner: "no code generated".to_string(),
                    full_metadata: String::new(),
                    page_changes,
                };
                self.task.lock().await.iterations.push(record);
                continue;
            }
            consecutive_no_code = 0;

            let mut block_results: Vec<BlockResult> = Vec::new();
            let mut final_value: Option<serde_json::Value> = None;
            for (idx, code) in blocks.iter().enumerate() {
                let block_index = idx as u32;
                let _ = self.events.send(EngineEvent::CodeGenerated { code: code.clone(), block_index });

                let result = sandbox.execute(code).await;
                let descriptor = describe(&result);
                let metadata = render_descriptor(&descriptor);
                let error = if result.is_error() { Some(metadata.clone()) } else { None };
                let _ = self.events.send(EngineEvent::CodeResult { metadata: metadata.clone(), block_index, error: error.clone() });
                block_results.push(BlockResult { code: code.clone(), metadata, error });

                if let Some(v) = sandbox.take_final() {
                    final_value = Some(v);
                    break;
                }
                if self.cancel.is_cancelled() {
                    break;
                }
            }

            let full_metadata = if block_results.len() > 1 {
                block_results.iter().enumerate().map(|(i, b)| format!("Block {}: {}", i + 1, b.metadata)).collect::<Vec<_>>().join("\n")
            } else {
                block_results.first().map(|b| b.metadata.clone()).unwrap_or_default()
            };
            let one_liner = synthesize_iteration(&block_results);

            let record = IterationRecord {
                index: iteration,
                started_at: iter_started_at,
                duration: elapsed_since(start, iter_started_at),
                blocks: block_results,
                one_liner,
                full_metadata,
                page_changes,
            };
            self.task.lock().await.iterations.push(record);

            let post_snapshot = self.driver.capture_snapshot().await.unwrap_or_default();
            let _ = tab_diff.diff(&post_snapshot);

            if self.cancel.is_cancelled() && final_value.is_none() {
                self.finish_cancelled(&task_id).await;
                return;
            }

            if let Some(v) = final_value {
                self.finish_complete(&task_id, Some(v)).await;
                return;
            }

            let exhausted = !self.task.lock().await.has_iteration_budget();
            if exhausted {
                self.finish_iteration_cap(&task_id, max_iterations).await;
                return;
            }
        }
    }

    /// Build the variable-descriptor listing (§4.2's "environment metadata
    /// production"): (a) every `env.*` key on the persistent `env` record,
    /// then (b) every top-level name the REPL has hoisted so far.
    async fn describe_environment<C: rlm_repl::EngineCallbacks + 'static>(
        &self,
        sandbox: &Sandbox<C>,
    ) -> Vec<(String, rlm_types::ValueDescriptor)> {
        let mut out = Vec::new();
        if let rlm_types::ReplValue::Object(entries) = sandbox.env_snapshot().await {
            for (key, value) in entries {
                out.push((format!("env.{key}"), describe(&value)));
            }
        }
        for name in sandbox.hoisted_names() {
            let value = sandbox.execute(&name).await;
            out.push((name, describe(&value)));
        }
        out
    }

    async fn finish_complete(&self, task_id: &TaskId, value: Option<serde_json::Value>) {
        self.task.lock().await.status = TaskStatus::Complete;
        tracing::info!(task_id = %task_id, "task completed");
        let _ = self.events.send(EngineEvent::Complete { final_value: value });
    }

    async fn finish_cancelled(&self, task_id: &TaskId) {
        self.task.lock().await.status = TaskStatus::Cancelled;
        tracing::info!(task_id = %task_id, "task cancelled");
        let _ = self.events.send(EngineEvent::cancelled());
    }

    async fn finish_error(&self, task_id: &TaskId, message: &str) {
        self.task.lock().await.status = TaskStatus::Error;
        tracing::info!(task_id = %task_id, error = message, "task errored");
        let _ = self.events.send(EngineEvent::Error { error: message.to_string() });
        let _ = self.events.send(EngineEvent::complete_null());
    }

    async fn finish_iteration_cap(&self, task_id: &TaskId, max_iterations: u32) {
        self.task.lock().await.status = TaskStatus::Complete;
        tracing::info!(task_id = %task_id, "iteration cap reached");
        let _ = self.events.send(EngineEvent::iteration_cap_reached(max_iterations));
    }
}
