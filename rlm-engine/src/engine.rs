//! The public engine surface (§6): `submit_task`/`cancel`/`get_state`/
//! `confirmation_response`, plus the `await_confirmation` hook point the
//! Open Question resolution (`SPEC_FULL.md` §9.1) calls for without wiring
//! any capability to it yet.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{mpsc, oneshot, Mutex as TokioMutex};
use tokio_util::sync::CancellationToken;

use rlm_driver::browser::BrowserDriver;
use rlm_driver::model::ModelClient;
use rlm_types::{EngineConfig, EngineError, EngineEvent, Task, TaskId, TaskStatus};

use crate::controller::Controller;
use crate::state::TaskState;

/// A writer the embedder supplies for the optional JSONL trace log (§6.2).
/// Shared across a Task's whole run since both the main loop and any
/// sub-agent calls emit onto the same event channel.
type TraceSink = Arc<StdMutex<Box<dyn Write + Send>>>;

struct RunningTask {
    task: Arc<TokioMutex<Task>>,
    cancel: CancellationToken,
    confirmation: Arc<StdMutex<Option<oneshot::Sender<bool>>>>,
    handle: tokio::task::JoinHandle<()>,
}

/// The RLM execution engine: holds exactly one running or most-recently-run
/// Task at a time, and owns the model/browser-driver handles every Task
/// needs (§1, "Exactly one Task runs in an engine instance at a time").
pub struct Engine<M: ModelClient + 'static> {
    config: EngineConfig,
    model: Arc<M>,
    driver: Arc<dyn BrowserDriver>,
    running: StdMutex<Option<RunningTask>>,
    task_seq: AtomicU64,
    trace: Option<TraceSink>,
}

impl<M: ModelClient + 'static> Engine<M> {
    /// Construct an engine over a validated configuration and the two
    /// consumed-contract handles (§1: concrete transports are external).
    pub fn new(config: EngineConfig, model: M, driver: Arc<dyn BrowserDriver>) -> Self {
        Self { config, model: Arc::new(model), driver, running: StdMutex::new(None), task_seq: AtomicU64::new(0), trace: None }
    }

    /// Attach an optional JSONL trace sink (§6.2): every `EngineEvent`
    /// except `StreamToken` is appended, one JSON object per line, to
    /// `writer` for every Task this engine subsequently runs. A durable
    /// replay artifact, distinct from both the live Event Bus and the
    /// `tracing` operator log.
    pub fn with_trace_sink(mut self, writer: impl Write + Send + 'static) -> Self {
        self.trace = Some(Arc::new(StdMutex::new(Box::new(writer) as Box<dyn Write + Send>)));
        self
    }

    /// If a trace sink is attached, interpose a forwarding task between the
    /// controller and `outer_tx`: every non-`StreamToken` event is appended
    /// to the sink as a JSON line before being forwarded on unchanged. With
    /// no sink attached, the controller just gets `outer_tx` directly.
    fn tee_into_trace_log(&self, outer_tx: mpsc::UnboundedSender<EngineEvent>) -> mpsc::UnboundedSender<EngineEvent> {
        let Some(trace) = self.trace.clone() else {
            return outer_tx;
        };
        let (inner_tx, mut inner_rx) = mpsc::unbounded_channel::<EngineEvent>();
        tokio::spawn(async move {
            while let Some(event) = inner_rx.recv().await {
                if !matches!(event, EngineEvent::StreamToken { .. }) {
                    if let Ok(line) = serde_json::to_string(&event) {
                        if let Ok(mut w) = trace.lock() {
                            let _ = writeln!(w, "{line}");
                        }
                    }
                }
                if outer_tx.send(event).is_err() {
                    break;
                }
            }
        });
        inner_tx
    }

    /// Submit a new Task. Fails with [`EngineError::Config`] if the engine's
    /// configuration doesn't validate, or [`EngineError::TaskBusy`] if a
    /// Task is already `Running`. Returns a channel of every event the Task
    /// emits, terminated by exactly one `EngineEvent::Complete` (§4.9).
    pub async fn submit_task(&self, message: impl Into<String>) -> Result<mpsc::UnboundedReceiver<EngineEvent>, EngineError> {
        self.config.validate()?;

        {
            let running = self.running.lock().unwrap();
            if let Some(existing) = running.as_ref() {
                if !existing.handle.is_finished() {
                    return Err(EngineError::TaskBusy);
                }
            }
        }

        let id = TaskId::new(format!("task-{}", self.task_seq.fetch_add(1, Ordering::SeqCst)));
        let task = Arc::new(TokioMutex::new(Task::new(id, message, self.config.max_iterations, self.config.max_sub_calls)));
        let cancel = CancellationToken::new();
        let confirmation: Arc<StdMutex<Option<oneshot::Sender<bool>>>> = Arc::new(StdMutex::new(None));
        let (outer_tx, rx) = mpsc::unbounded_channel();
        let controller_events = self.tee_into_trace_log(outer_tx);

        let controller = Controller {
            config: self.config.clone(),
            model: Arc::clone(&self.model),
            driver: Arc::clone(&self.driver),
            task: Arc::clone(&task),
            events: controller_events,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(controller.run());

        *self.running.lock().unwrap() = Some(RunningTask { task, cancel, confirmation, handle });
        Ok(rx)
    }

    /// Request cancellation of the currently running Task. Cooperative: the
    /// loop observes this at its next checkpoint (§5) and always re-emits a
    /// terminal `complete` event, even if the loop had already exited.
    pub fn cancel(&self) -> Result<(), EngineError> {
        let running = self.running.lock().unwrap();
        match running.as_ref() {
            Some(r) => {
                r.cancel.cancel();
                Ok(())
            }
            None => Err(EngineError::NoActiveTask),
        }
    }

    /// Snapshot the currently (or most recently) running Task's state.
    pub async fn get_state(&self) -> TaskState {
        let task = { self.running.lock().unwrap().as_ref().map(|r| Arc::clone(&r.task)) };
        match task {
            Some(task) => TaskState::from(&*task.lock().await),
            None => TaskState::idle(),
        }
    }

    /// Resolve a pending [`Engine::await_confirmation`] call, if one is
    /// outstanding. No REPL capability calls `await_confirmation` today
    /// (§9.1's third Open Question resolution keeps sensitive-action gating
    /// a dead-but-present hook point) — this still has an effect only once
    /// some future gated capability starts calling it.
    pub fn confirmation_response(&self, approved: bool) -> Result<(), EngineError> {
        let running = self.running.lock().unwrap();
        match running.as_ref() {
            Some(r) => {
                if let Some(tx) = r.confirmation.lock().unwrap().take() {
                    let _ = tx.send(approved);
                }
                Ok(())
            }
            None => Err(EngineError::NoActiveTask),
        }
    }

    /// Suspend until an operator responds via [`Engine::confirmation_response`],
    /// or `false` if no Task is running to confirm against.
    pub async fn await_confirmation(&self) -> bool {
        let rx = {
            let running = self.running.lock().unwrap();
            match running.as_ref() {
                Some(r) => {
                    let (tx, rx) = oneshot::channel();
                    *r.confirmation.lock().unwrap() = Some(tx);
                    rx
                }
                None => return false,
            }
        };
        rx.await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rlm_driver::browser::ScriptedBrowserDriver;
    use rlm_driver::model::{ModelError, ScriptedModelClient};
    use rlm_types::config::{DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_SUB_CALLS};
    use rlm_types::{ProviderKind, SecretString};

    fn config() -> EngineConfig {
        EngineConfig {
            provider: ProviderKind::AnthropicStyle,
            api_key: SecretString::new("sk-test"),
            base_url: None,
            primary_model: "claude-sonnet-4-20250514".into(),
            sub_model: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_sub_calls: DEFAULT_MAX_SUB_CALLS,
        }
    }

    fn engine(responses: Vec<Result<String, ModelError>>) -> Engine<ScriptedModelClient> {
        let model = ScriptedModelClient::new(responses);
        let driver = Arc::new(ScriptedBrowserDriver::new("https://example.com", vec![]));
        Engine::new(config(), model, driver)
    }

    #[tokio::test]
    async fn idle_engine_reports_idle_state() {
        let e = engine(vec![]);
        assert_eq!(e.get_state().await.status, TaskStatus::Idle);
    }

    #[tokio::test]
    async fn cancel_with_no_active_task_errors() {
        let e = engine(vec![]);
        assert!(matches!(e.cancel(), Err(EngineError::NoActiveTask)));
    }

    #[tokio::test]
    async fn submit_task_runs_to_completion_on_immediate_set_final() {
        let e = engine(vec![Ok("```repl\nsetFinal(\"hello\")\n```".to_string())]);
        let mut rx = e.submit_task("say hello").await.unwrap();

        let mut last = None;
        while let Some(ev) = rx.recv().await {
            last = Some(ev);
        }
        assert!(matches!(last, Some(EngineEvent::Complete { .. })));
        assert_eq!(e.get_state().await.status, TaskStatus::Complete);
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<StdMutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn trace_sink_receives_every_non_stream_token_event_as_a_json_line() {
        let model = ScriptedModelClient::new(vec![
            Ok("```repl\nlog('hi');\n```".to_string()),
            Ok("```repl\nsetFinal(1)\n```".to_string()),
        ]);
        let driver = Arc::new(ScriptedBrowserDriver::new("https://example.com", vec![]));
        let buf = SharedBuf::default();
        let e = Engine::new(config(), model, driver).with_trace_sink(buf.clone());

        let mut rx = e.submit_task("trace me").await.unwrap();
        while rx.recv().await.is_some() {}

        let contents = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert!(!lines.is_empty());
        for line in &lines {
            let parsed: serde_json::Value = serde_json::from_str(line).expect("every line is a JSON object");
            assert!(!parsed["type"].as_str().unwrap_or_default().is_empty());
            assert_ne!(parsed["type"], serde_json::json!("stream-token"));
        }
        assert!(lines.iter().any(|l| l.contains("\"complete\"")));
    }

    #[tokio::test]
    async fn submitting_while_busy_is_rejected() {
        let e = engine(vec![Ok("no code here".to_string()); 5]);
        let _rx = e.submit_task("first").await.unwrap();
        let result = e.submit_task("second").await;
        assert!(matches!(result, Err(EngineError::TaskBusy)));
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_any_task_starts() {
        let mut bad = config();
        bad.max_iterations = 0;
        let model = ScriptedModelClient::new(vec![]);
        let driver = Arc::new(ScriptedBrowserDriver::new("https://example.com", vec![]));
        let e = Engine::new(bad, model, driver);
        assert!(matches!(e.submit_task("hi").await, Err(EngineError::Config(_))));
    }
}
