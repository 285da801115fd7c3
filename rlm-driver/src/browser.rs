//! The Browser Driver contract (consumed, §6) — contract only.
//!
//! The concrete implementation (wiring `exec`/`open_tab`/etc. to a real
//! browser renderer process) is external to this crate; §1 places the
//! concrete `exec_in_tab` primitive explicitly out of scope. This module
//! defines the trait the loop controller and REPL runtime depend on, plus
//! a scripted in-memory double for tests.

use async_trait::async_trait;
use rlm_types::task::{Snapshot, TabState};
use std::collections::BTreeMap;
use std::sync::Mutex;
use thiserror::Error;

/// Errors from a `BrowserDriver` implementation.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DriverError {
    /// The referenced tab id does not exist.
    #[error("unknown tab id: {0}")]
    UnknownTab(String),
    /// A wait (`wait_for_load`/`wait_for_selector`) exceeded its timeout.
    #[error("timed out waiting: {0}")]
    Timeout(String),
    /// Catch-all for transport/renderer-specific failures.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// One entry of `list_tabs()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    /// The tab's id.
    pub id: String,
    /// Currently loaded URL.
    pub url: String,
    /// Document title.
    pub title: String,
    /// Load status, e.g. `"loading"` / `"complete"`.
    pub status: String,
    /// Favicon URL, if known.
    pub favicon: Option<String>,
}

/// The driver contract the engine consumes to manipulate live browser tabs.
///
/// Held as `Arc<dyn BrowserDriver>` by the loop controller and REPL
/// runtime, shared between the main agent and any concurrently running
/// sub-agents (§5, "Shared resources").
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Run `js_code` in `tab_id`'s renderer context; the result must be
    /// JSON-serializable. This is the `execInTab` primitive (§4.2); its
    /// concrete implementation is external to this crate.
    async fn exec(&self, tab_id: &str, js_code: &str) -> Result<serde_json::Value, DriverError>;

    /// Open a new tab, optionally navigating it to `url` immediately.
    async fn open_tab(&self, url: Option<&str>) -> Result<String, DriverError>;

    /// Close a tab.
    async fn close_tab(&self, tab_id: &str) -> Result<(), DriverError>;

    /// Navigate an existing tab to `url`.
    async fn navigate(&self, tab_id: &str, url: &str) -> Result<(), DriverError>;

    /// Make `tab_id` the active tab.
    async fn switch_tab(&self, tab_id: &str) -> Result<(), DriverError>;

    /// Wait up to `timeout_ms` for `tab_id`'s document to finish loading.
    async fn wait_for_load(&self, tab_id: &str, timeout_ms: u64) -> Result<(), DriverError>;

    /// Wait up to `timeout_ms` for `selector` to appear in `tab_id`.
    async fn wait_for_selector(&self, tab_id: &str, selector: &str, timeout_ms: u64) -> Result<(), DriverError>;

    /// List every open tab.
    async fn list_tabs(&self) -> Result<Vec<TabInfo>, DriverError>;

    /// The currently active tab's id, if any.
    async fn active_tab_id(&self) -> Result<Option<String>, DriverError>;

    /// Capture a `{url, title, status}` snapshot of every open tab.
    async fn capture_snapshot(&self) -> Result<Snapshot, DriverError> {
        let tabs = self.list_tabs().await?;
        Ok(tabs
            .into_iter()
            .map(|t| {
                (
                    t.id,
                    TabState { url: t.url, title: t.title, status: t.status },
                )
            })
            .collect())
    }
}

/// A scripted in-memory `BrowserDriver` for tests: tabs are pure state,
/// `exec` returns pre-programmed responses keyed by call order.
pub struct ScriptedBrowserDriver {
    tabs: Mutex<BTreeMap<String, TabInfo>>,
    active: Mutex<Option<String>>,
    next_id: Mutex<u64>,
    exec_script: Mutex<std::collections::VecDeque<serde_json::Value>>,
}

impl ScriptedBrowserDriver {
    /// Create a driver with one initial tab and a queue of `exec` responses
    /// to hand out in order.
    pub fn new(initial_url: impl Into<String>, exec_responses: Vec<serde_json::Value>) -> Self {
        let id = "tab-0".to_string();
        let mut tabs = BTreeMap::new();
        tabs.insert(
            id.clone(),
            TabInfo {
                id: id.clone(),
                url: initial_url.into(),
                title: String::new(),
                status: "complete".into(),
                favicon: None,
            },
        );
        Self {
            tabs: Mutex::new(tabs),
            active: Mutex::new(Some(id)),
            next_id: Mutex::new(1),
            exec_script: Mutex::new(exec_responses.into()),
        }
    }
}

#[async_trait]
impl BrowserDriver for ScriptedBrowserDriver {
    async fn exec(&self, tab_id: &str, _js_code: &str) -> Result<serde_json::Value, DriverError> {
        if !self.tabs.lock().unwrap().contains_key(tab_id) {
            return Err(DriverError::UnknownTab(tab_id.to_string()));
        }
        Ok(self.exec_script.lock().unwrap().pop_front().unwrap_or(serde_json::Value::Null))
    }

    async fn open_tab(&self, url: Option<&str>) -> Result<String, DriverError> {
        let mut next_id = self.next_id.lock().unwrap();
        let id = format!("tab-{}", *next_id);
        *next_id += 1;
        self.tabs.lock().unwrap().insert(
            id.clone(),
            TabInfo {
                id: id.clone(),
                url: url.unwrap_or("about:blank").to_string(),
                title: String::new(),
                status: "complete".into(),
                favicon: None,
            },
        );
        Ok(id)
    }

    async fn close_tab(&self, tab_id: &str) -> Result<(), DriverError> {
        self.tabs.lock().unwrap().remove(tab_id);
        Ok(())
    }

    async fn navigate(&self, tab_id: &str, url: &str) -> Result<(), DriverError> {
        let mut tabs = self.tabs.lock().unwrap();
        let tab = tabs.get_mut(tab_id).ok_or_else(|| DriverError::UnknownTab(tab_id.to_string()))?;
        tab.url = url.to_string();
        Ok(())
    }

    async fn switch_tab(&self, tab_id: &str) -> Result<(), DriverError> {
        if !self.tabs.lock().unwrap().contains_key(tab_id) {
            return Err(DriverError::UnknownTab(tab_id.to_string()));
        }
        *self.active.lock().unwrap() = Some(tab_id.to_string());
        Ok(())
    }

    async fn wait_for_load(&self, tab_id: &str, _timeout_ms: u64) -> Result<(), DriverError> {
        if !self.tabs.lock().unwrap().contains_key(tab_id) {
            return Err(DriverError::UnknownTab(tab_id.to_string()));
        }
        Ok(())
    }

    async fn wait_for_selector(&self, tab_id: &str, _selector: &str, _timeout_ms: u64) -> Result<(), DriverError> {
        if !self.tabs.lock().unwrap().contains_key(tab_id) {
            return Err(DriverError::UnknownTab(tab_id.to_string()));
        }
        Ok(())
    }

    async fn list_tabs(&self) -> Result<Vec<TabInfo>, DriverError> {
        Ok(self.tabs.lock().unwrap().values().cloned().collect())
    }

    async fn active_tab_id(&self) -> Result<Option<String>, DriverError> {
        Ok(self.active.lock().unwrap().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn open_tab_assigns_a_fresh_id() {
        let d = ScriptedBrowserDriver::new("https://example.com", vec![]);
        let id = d.open_tab(Some("https://a.test")).await.unwrap();
        assert_eq!(id, "tab-1");
        assert_eq!(d.list_tabs().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn exec_against_unknown_tab_errors() {
        let d = ScriptedBrowserDriver::new("https://example.com", vec![]);
        let err = d.exec("nope", "1+1").await.unwrap_err();
        assert!(matches!(err, DriverError::UnknownTab(_)));
    }

    #[tokio::test]
    async fn exec_responses_are_consumed_in_order() {
        let d = ScriptedBrowserDriver::new("https://example.com", vec![json!(1), json!(2)]);
        assert_eq!(d.exec("tab-0", "x").await.unwrap(), json!(1));
        assert_eq!(d.exec("tab-0", "x").await.unwrap(), json!(2));
        assert_eq!(d.exec("tab-0", "x").await.unwrap(), serde_json::Value::Null);
    }

    #[tokio::test]
    async fn capture_snapshot_reflects_list_tabs() {
        let d = ScriptedBrowserDriver::new("https://example.com", vec![]);
        let snap = d.capture_snapshot().await.unwrap();
        assert_eq!(snap.get("tab-0").unwrap().url, "https://example.com");
    }

    #[tokio::test]
    async fn close_tab_removes_it_from_the_list() {
        let d = ScriptedBrowserDriver::new("https://example.com", vec![]);
        let id = d.open_tab(None).await.unwrap();
        d.close_tab(&id).await.unwrap();
        assert_eq!(d.list_tabs().await.unwrap().len(), 1);
    }
}
