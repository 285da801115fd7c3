//! Workspace-level integration tests: exercises the full `rlm` umbrella
//! surface end to end, the way an embedder would use it — `Engine` wired to
//! a `BrowserDriver` implementation it supplies itself (not the scripted
//! in-crate test double) and a scripted `ModelClient`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use rlm::prelude::*;
use rlm_driver::browser::DriverError;

/// A minimal embedder-supplied `BrowserDriver`: one fixed tab, `exec`
/// always succeeds with `null`. Stands in for a real renderer-backed
/// implementation to prove the engine only depends on the trait, not on
/// `rlm-driver`'s own `ScriptedBrowserDriver`.
struct SingleTabDriver {
    tabs: Mutex<BTreeMap<String, (String, String)>>,
    next_id: AtomicU64,
}

impl SingleTabDriver {
    fn new(url: &str) -> Self {
        let mut tabs = BTreeMap::new();
        tabs.insert("tab-0".to_string(), (url.to_string(), String::new()));
        Self { tabs: Mutex::new(tabs), next_id: AtomicU64::new(1) }
    }
}

#[async_trait]
impl BrowserDriver for SingleTabDriver {
    async fn exec(&self, _tab_id: &str, _js_code: &str) -> Result<serde_json::Value, DriverError> {
        Ok(serde_json::Value::Null)
    }

    async fn open_tab(&self, url: Option<&str>) -> Result<String, DriverError> {
        let id = format!("tab-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.tabs.lock().unwrap().insert(id.clone(), (url.unwrap_or("about:blank").to_string(), String::new()));
        Ok(id)
    }

    async fn close_tab(&self, tab_id: &str) -> Result<(), DriverError> {
        self.tabs.lock().unwrap().remove(tab_id);
        Ok(())
    }

    async fn navigate(&self, tab_id: &str, url: &str) -> Result<(), DriverError> {
        let mut tabs = self.tabs.lock().unwrap();
        let entry = tabs.get_mut(tab_id).ok_or_else(|| DriverError::UnknownTab(tab_id.to_string()))?;
        entry.0 = url.to_string();
        Ok(())
    }

    async fn switch_tab(&self, _tab_id: &str) -> Result<(), DriverError> {
        Ok(())
    }

    async fn wait_for_load(&self, _tab_id: &str, _timeout_ms: u64) -> Result<(), DriverError> {
        Ok(())
    }

    async fn wait_for_selector(&self, _tab_id: &str, _selector: &str, _timeout_ms: u64) -> Result<(), DriverError> {
        Ok(())
    }

    async fn list_tabs(&self) -> Result<Vec<TabInfo>, DriverError> {
        Ok(self
            .tabs
            .lock()
            .unwrap()
            .iter()
            .map(|(id, (url, title))| TabInfo { id: id.clone(), url: url.clone(), title: title.clone(), status: "complete".into(), favicon: None })
            .collect())
    }

    async fn active_tab_id(&self) -> Result<Option<String>, DriverError> {
        Ok(Some("tab-0".to_string()))
    }
}

fn config() -> EngineConfig {
    rlm::default_config(ProviderKind::AnthropicStyle, SecretString::new("sk-test"), "claude-sonnet-4-20250514")
}

#[tokio::test]
async fn a_full_task_runs_to_completion_with_an_embedder_supplied_driver() {
    let driver = std::sync::Arc::new(SingleTabDriver::new("https://example.com"));
    let model = ScriptedModelClient::new(vec![
        Ok("```repl\nconst x = 1 + 1;\nlog(`computed ${x}`);\n```".to_string()),
        Ok("```repl\nsetFinal({ result: x * 21 });\n```".to_string()),
    ]);
    let engine = Engine::new(config(), model, driver);

    let mut rx = engine.submit_task("multiply something by 21").await.expect("task accepted");

    let mut saw_iteration_start = false;
    let mut saw_log = false;
    let mut final_value = None;
    while let Some(event) = rx.recv().await {
        match event {
            EngineEvent::IterationStart { .. } => saw_iteration_start = true,
            EngineEvent::Log { message } => {
                if message.contains("computed 2") {
                    saw_log = true;
                }
            }
            EngineEvent::Complete { final_value: v } => final_value = v,
            _ => {}
        }
    }

    assert!(saw_iteration_start, "expected at least one iteration-start event");
    assert!(saw_log, "expected the REPL's log() call to reach the event stream");
    assert_eq!(final_value, Some(serde_json::json!({ "result": 42 })));

    let state = engine.get_state().await;
    assert_eq!(state.status, TaskStatus::Complete);
    assert_eq!(state.iterations_run, 2);
}

#[tokio::test]
async fn cancelling_immediately_after_submission_short_circuits_before_any_iteration() {
    let driver = std::sync::Arc::new(SingleTabDriver::new("https://example.com"));
    let model = ScriptedModelClient::new(vec![Ok("```repl\nsetFinal(1)\n```".to_string())]);
    let engine = Engine::new(config(), model, driver);

    let mut rx = engine.submit_task("irrelevant, should never run").await.expect("task accepted");
    engine.cancel().expect("a task is running");

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert!(!events.iter().any(|e| matches!(e, EngineEvent::IterationStart { .. })), "no iteration should have started");
    match events.last() {
        Some(EngineEvent::Complete { final_value: Some(v) }) => assert_eq!(v.as_str().unwrap(), "Task cancelled by user."),
        other => panic!("expected a cancellation Complete event, got {other:?}"),
    }
    assert_eq!(engine.get_state().await.status, TaskStatus::Cancelled);
}

#[tokio::test]
async fn submitting_a_second_task_while_one_is_running_is_rejected() {
    let driver = std::sync::Arc::new(SingleTabDriver::new("https://example.com"));
    let model = ScriptedModelClient::new(vec![Ok("no code, just thinking out loud".to_string()); 10]);
    let engine = Engine::new(config(), model, driver);

    let _rx = engine.submit_task("first task").await.expect("first task accepted");
    let second = engine.submit_task("second task").await;
    assert!(matches!(second, Err(EngineError::TaskBusy)));
}
