//! The capability surface (§4.2): a registry of host functions bound into
//! the REPL's global scope at construction.
//!
//! Grounded on `neuron-tool`'s `ToolDyn`/`ToolRegistry` object-safe dispatch
//! idiom: each capability is named, takes a single JSON value, and returns
//! a JSON value or an error — the same shape `ToolDyn::call` uses to erase
//! a tool's concrete input/output types behind one dyn-compatible surface.
//! Here the "tools" are fixed rather than user-registered, so the registry
//! is built once per REPL from its `BrowserDriver`/`EngineCallbacks`
//! handles rather than populated externally.
//!
//! A main-agent REPL and a sub-agent REPL differ only in which
//! `EngineCallbacks` implementation they were built with — `llm_query`/
//! `llm_batch` dispatch identically in both; it is
//! [`crate::callbacks::SubAgentCallbacks`] that turns them into sentinels.

use crate::error::ReplError;
use rlm_driver::browser::BrowserDriver;
use rlm_types::config::{EXEC_IN_TAB_TIMEOUT_MS, LOG_MAX_CHARS, SLEEP_CAP_MS, WAIT_TIMEOUT_MS};
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::callbacks::{EngineCallbacks, SubCallOutcome};

/// Every JS-visible capability name (§4.2's exposed API table), in the
/// order they're documented there.
pub const CAPABILITY_NAMES: &[&str] = &[
    "tabs",
    "activeTab",
    "openTab",
    "closeTab",
    "navigate",
    "switchTab",
    "waitForLoad",
    "waitForSelector",
    "execInTab",
    "getText",
    "getDOM",
    "getLinks",
    "getInputs",
    "querySelector",
    "querySelectorAll",
    "getSearchResults",
    "getWikiTables",
    "click",
    "type",
    "scroll",
    "parseHTML",
    "parsePage",
    "domQueryAll",
    "domQueryOne",
    "domQueryText",
    "freeDoc",
    "llm_query",
    "llm_batch",
    "setFinal",
    "log",
    "sleep",
];

fn arg_str(args: &Value, key: &str, capability: &str) -> Result<String, ReplError> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ReplError::InvalidArguments {
            capability: capability.to_string(),
            message: format!("missing string argument `{key}`"),
        })
}

fn arg_str_opt(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

fn arg_u64(args: &Value, key: &str, default: u64) -> u64 {
    args.get(key).and_then(Value::as_u64).unwrap_or(default)
}

/// Host-side state backing the parsed-document handles `parseHTML`/
/// `parsePage` hand back to JS. Kept separate from the driver: parsing is
/// local string/DOM-tree work, not a round trip to a tab's renderer.
#[derive(Default)]
pub struct DocStore {
    docs: std::sync::Mutex<std::collections::HashMap<u64, scraper::Html>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl DocStore {
    fn insert(&self, html: scraper::Html) -> u64 {
        let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.docs.lock().unwrap().insert(id, html);
        id
    }

    fn with_doc<T>(&self, id: u64, f: impl FnOnce(&scraper::Html) -> T) -> Option<T> {
        self.docs.lock().unwrap().get(&id).map(f)
    }

    fn free(&self, id: u64) -> bool {
        self.docs.lock().unwrap().remove(&id).is_some()
    }
}

/// The registry dispatched into from the sandbox's host function bindings.
///
/// Owns the handles a capability needs (`BrowserDriver`, `EngineCallbacks`)
/// plus the in-process `DocStore` for parsed-HTML handles. Cheap to clone —
/// every field is an `Arc`.
pub struct CapabilityRegistry<C: EngineCallbacks> {
    driver: Arc<dyn BrowserDriver>,
    callbacks: Arc<C>,
    docs: Arc<DocStore>,
    active_tab: std::sync::Mutex<Option<String>>,
    final_value: std::sync::Mutex<Option<Value>>,
}

impl<C: EngineCallbacks> Clone for CapabilityRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            driver: Arc::clone(&self.driver),
            callbacks: Arc::clone(&self.callbacks),
            docs: Arc::clone(&self.docs),
            active_tab: std::sync::Mutex::new(self.active_tab.lock().unwrap().clone()),
            final_value: std::sync::Mutex::new(None),
        }
    }
}

impl<C: EngineCallbacks> CapabilityRegistry<C> {
    /// Build a registry bound to one REPL's driver and callback handle.
    pub fn new(driver: Arc<dyn BrowserDriver>, callbacks: Arc<C>) -> Self {
        Self {
            driver,
            callbacks,
            docs: Arc::new(DocStore::default()),
            active_tab: std::sync::Mutex::new(None),
            final_value: std::sync::Mutex::new(None),
        }
    }

    /// Whether `setFinal` was called during the most recent `execute()`.
    /// The sandbox resets this at the start of every `execute()` call
    /// (§4.2 step 1, "reset final_called").
    pub fn take_final(&self) -> Option<Value> {
        self.final_value.lock().unwrap().take()
    }

    async fn resolve_tab(&self, explicit: Option<String>) -> Result<String, ReplError> {
        if let Some(t) = explicit {
            return Ok(t);
        }
        if let Some(t) = self.active_tab.lock().unwrap().clone() {
            return Ok(t);
        }
        self.driver
            .active_tab_id()
            .await?
            .ok_or_else(|| ReplError::InvalidArguments {
                capability: "<tab-resolution>".into(),
                message: "no active tab and none specified".into(),
            })
    }

    /// Dispatch one capability call by name. `args` is the already-JSON
    /// argument object/array passed from JS; the result is handed back
    /// across the boundary as JSON too (§4.2, "serialization").
    pub async fn dispatch(&self, name: &str, args: Value) -> Result<Value, ReplError> {
        match name {
            "tabs" => {
                let tabs = self.driver.list_tabs().await?;
                Ok(json!(tabs
                    .into_iter()
                    .map(|t| json!({
                        "id": t.id, "url": t.url, "title": t.title,
                        "status": t.status, "favicon": t.favicon,
                    }))
                    .collect::<Vec<_>>()))
            }
            "activeTab" => Ok(json!(self.driver.active_tab_id().await?)),
            "openTab" => {
                let url = arg_str_opt(&args, "url");
                let id = self.driver.open_tab(url.as_deref()).await?;
                Ok(json!(id))
            }
            "closeTab" => {
                let id = arg_str(&args, "tabId", name)?;
                self.driver.close_tab(&id).await?;
                Ok(Value::Null)
            }
            "navigate" => {
                let id = self.resolve_tab(arg_str_opt(&args, "tabId")).await?;
                let url = arg_str(&args, "url", name)?;
                self.driver.navigate(&id, &url).await?;
                Ok(Value::Null)
            }
            "switchTab" => {
                let id = arg_str(&args, "tabId", name)?;
                self.driver.switch_tab(&id).await?;
                *self.active_tab.lock().unwrap() = Some(id);
                Ok(Value::Null)
            }
            "waitForLoad" => {
                let id = self.resolve_tab(arg_str_opt(&args, "tabId")).await?;
                let timeout = arg_u64(&args, "timeoutMs", WAIT_TIMEOUT_MS);
                self.driver.wait_for_load(&id, timeout).await?;
                Ok(Value::Null)
            }
            "waitForSelector" => {
                let id = self.resolve_tab(arg_str_opt(&args, "tabId")).await?;
                let selector = arg_str(&args, "selector", name)?;
                let timeout = arg_u64(&args, "timeoutMs", WAIT_TIMEOUT_MS);
                self.driver.wait_for_selector(&id, &selector, timeout).await?;
                Ok(Value::Null)
            }
            "execInTab" => {
                let id = self.resolve_tab(arg_str_opt(&args, "tabId")).await?;
                let code = arg_str(&args, "code", name)?;
                Ok(self.driver.exec(&id, &code).await?)
            }
            "getText" => self.probe(&args, name, "document.body ? document.body.innerText : ''").await,
            "getDOM" => self.probe(&args, name, "document.documentElement.outerHTML").await,
            "getLinks" => {
                self.probe(
                    &args,
                    name,
                    "Array.from(document.querySelectorAll('a[href]')).map(a => ({href: a.href, text: a.innerText}))",
                )
                .await
            }
            "getInputs" => {
                self.probe(
                    &args,
                    name,
                    "Array.from(document.querySelectorAll('input,textarea,select')).map(e => ({name: e.name, type: e.type, value: e.value}))",
                )
                .await
            }
            "querySelector" => {
                let selector = arg_str(&args, "selector", name)?;
                self.probe_with(&args, name, &format!(
                    "(() => {{ const e = document.querySelector({selector:?}); return e ? e.outerHTML : null; }})()",
                    selector = selector
                )).await
            }
            "querySelectorAll" => {
                let selector = arg_str(&args, "selector", name)?;
                self.probe_with(&args, name, &format!(
                    "Array.from(document.querySelectorAll({selector:?})).map(e => e.outerHTML)",
                    selector = selector
                )).await
            }
            "getSearchResults" => {
                self.probe(
                    &args,
                    name,
                    "Array.from(document.querySelectorAll('a h3, .result__title a')).map(a => ({title: a.innerText, href: a.closest('a') ? a.closest('a').href : a.href}))",
                )
                .await
            }
            "getWikiTables" => {
                self.probe(
                    &args,
                    name,
                    "Array.from(document.querySelectorAll('table.wikitable')).map(t => t.outerHTML)",
                )
                .await
            }
            "click" => {
                let selector = arg_str(&args, "selector", name)?;
                self.probe_with(&args, name, &format!(
                    "(() => {{ const e = document.querySelector({selector:?}); if (!e) throw new Error('no element matches selector'); e.click(); return true; }})()",
                    selector = selector
                )).await
            }
            "type" => {
                let selector = arg_str(&args, "selector", name)?;
                let text = arg_str(&args, "text", name)?;
                self.probe_with(&args, name, &format!(
                    "(() => {{ const e = document.querySelector({selector:?}); if (!e) throw new Error('no element matches selector'); e.value = {text:?}; e.dispatchEvent(new Event('input', {{bubbles: true}})); return true; }})()",
                    selector = selector, text = text
                )).await
            }
            "scroll" => {
                let dx = args.get("dx").and_then(Value::as_f64).unwrap_or(0.0);
                let dy = args.get("dy").and_then(Value::as_f64).unwrap_or(0.0);
                self.probe_with(&args, name, &format!("window.scrollBy({dx}, {dy})")).await
            }
            "parseHTML" => {
                let html = arg_str(&args, "html", name)?;
                let doc = scraper::Html::parse_document(&html);
                Ok(json!(self.docs.insert(doc)))
            }
            "parsePage" => {
                let id = self.resolve_tab(arg_str_opt(&args, "tabId")).await?;
                let html = self.driver.exec(&id, "document.documentElement.outerHTML").await?;
                let html = html.as_str().ok_or_else(|| ReplError::Serialization("parsePage: exec did not return a string".into()))?;
                let doc = scraper::Html::parse_document(html);
                Ok(json!(self.docs.insert(doc)))
            }
            "domQueryAll" => self.dom_query(&args, name, true, false),
            "domQueryOne" => self.dom_query(&args, name, false, false),
            "domQueryText" => self.dom_query(&args, name, false, true),
            "freeDoc" => {
                let doc_id = args.get("docId").and_then(Value::as_u64).ok_or_else(|| ReplError::InvalidArguments {
                    capability: name.into(),
                    message: "missing numeric `docId`".into(),
                })?;
                Ok(json!(self.docs.free(doc_id)))
            }
            "llm_query" => {
                let prompt = arg_str(&args, "prompt", name)?;
                let data = args.get("data").cloned().and_then(|v| serde_json::from_value(v).ok());
                Ok(json!(self.callbacks.on_sub_call(&prompt, data).await))
            }
            "llm_batch" => {
                let prompts: Vec<String> = args
                    .get("prompts")
                    .and_then(|v| v.as_array())
                    .map(|a| a.iter().filter_map(|p| p.as_str().map(str::to_string)).collect())
                    .unwrap_or_default();
                let outcomes = self.callbacks.on_sub_batch(prompts).await;
                Ok(json!(outcomes
                    .into_iter()
                    .map(|o| match o {
                        SubCallOutcome::Fulfilled(v) => json!({"status": "fulfilled", "value": v}),
                        SubCallOutcome::Rejected(e) => json!({"status": "rejected", "error": e}),
                    })
                    .collect::<Vec<_>>()))
            }
            "setFinal" => {
                *self.final_value.lock().unwrap() = Some(args.clone());
                self.callbacks.on_set_final(&value_to_repl(&args)).await;
                Ok(Value::Null)
            }
            "log" => {
                let message = args.as_str().map(str::to_string).unwrap_or_else(|| args.to_string());
                let capped: String = message.chars().take(LOG_MAX_CHARS).collect();
                self.callbacks.on_log(&capped).await;
                Ok(Value::Null)
            }
            "sleep" => {
                let requested = args.as_u64().unwrap_or(0);
                let capped = requested.min(SLEEP_CAP_MS);
                tokio::time::sleep(std::time::Duration::from_millis(capped)).await;
                Ok(Value::Null)
            }
            other => Err(ReplError::UnknownCapability(other.to_string())),
        }
    }

    async fn probe(&self, args: &Value, capability: &str, js: &str) -> Result<Value, ReplError> {
        let id = self.resolve_tab(arg_str_opt(args, "tabId")).await?;
        self.driver.exec(&id, js).await.map_err(|e| ReplError::Driver(e)).map_err(|e| {
            let _ = capability;
            e
        })
    }

    async fn probe_with(&self, args: &Value, _capability: &str, js: &str) -> Result<Value, ReplError> {
        let id = self.resolve_tab(arg_str_opt(args, "tabId")).await?;
        Ok(self.driver.exec(&id, js).await?)
    }

    fn dom_query(&self, args: &Value, capability: &str, all: bool, text_only: bool) -> Result<Value, ReplError> {
        let doc_id = args.get("docId").and_then(Value::as_u64).ok_or_else(|| ReplError::InvalidArguments {
            capability: capability.into(),
            message: "missing numeric `docId`".into(),
        })?;
        let selector = arg_str(args, "selector", capability)?;
        let sel = scraper::Selector::parse(&selector)
            .map_err(|e| ReplError::InvalidArguments { capability: capability.into(), message: format!("bad selector: {e:?}") })?;

        self.docs
            .with_doc(doc_id, |doc| {
                let render = |el: scraper::ElementRef| {
                    if text_only {
                        json!(el.text().collect::<String>())
                    } else {
                        json!(el.html())
                    }
                };
                if all {
                    json!(doc.select(&sel).map(render).collect::<Vec<_>>())
                } else {
                    doc.select(&sel).next().map(render).unwrap_or(Value::Null)
                }
            })
            .ok_or_else(|| ReplError::InvalidArguments { capability: capability.into(), message: format!("unknown docId {doc_id}") })
    }
}

fn value_to_repl(v: &Value) -> rlm_types::value::ReplValue {
    serde_json::from_value(v.clone()).unwrap_or(rlm_types::value::ReplValue::Null)
}

/// Boxed-future shape a registry dispatch call returns, named for parity
/// with `neuron-tool`'s `ToolDyn::call` signature even though this crate
/// dispatches through a concrete match rather than a `HashMap` of trait
/// objects (the capability set is fixed, not user-extensible).
pub type DispatchFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, ReplError>> + Send + 'a>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::NullCallbacks;
    use rlm_driver::browser::ScriptedBrowserDriver;

    fn registry() -> CapabilityRegistry<NullCallbacks> {
        let driver = Arc::new(ScriptedBrowserDriver::new("https://example.com", vec![json!("hi")]));
        CapabilityRegistry::new(driver, Arc::new(NullCallbacks))
    }

    #[tokio::test]
    async fn tabs_lists_the_initial_tab() {
        let r = registry();
        let v = r.dispatch("tabs", Value::Null).await.unwrap();
        assert_eq!(v.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn open_tab_then_navigate_round_trips() {
        let r = registry();
        let id = r.dispatch("openTab", json!({})).await.unwrap();
        let id = id.as_str().unwrap().to_string();
        r.dispatch("navigate", json!({"tabId": id, "url": "https://a.test"})).await.unwrap();
    }

    #[tokio::test]
    async fn set_final_records_value_and_forwards_to_callbacks() {
        let r = registry();
        r.dispatch("setFinal", json!(42)).await.unwrap();
        assert_eq!(r.take_final(), Some(json!(42)));
        assert_eq!(r.take_final(), None);
    }

    #[tokio::test]
    async fn sleep_caps_at_the_configured_maximum() {
        let r = registry();
        let start = std::time::Instant::now();
        r.dispatch("sleep", json!(1)).await.unwrap();
        assert!(start.elapsed().as_millis() < 500);
    }

    #[tokio::test]
    async fn unknown_capability_errors() {
        let r = registry();
        let err = r.dispatch("doesNotExist", Value::Null).await.unwrap_err();
        assert!(matches!(err, ReplError::UnknownCapability(_)));
    }

    #[tokio::test]
    async fn parse_html_and_dom_query_all_round_trip() {
        let r = registry();
        let doc_id = r.dispatch("parseHTML", json!({"html": "<p class='a'>x</p><p class='a'>y</p>"})).await.unwrap();
        let results = r.dispatch("domQueryAll", json!({"docId": doc_id, "selector": "p.a"})).await.unwrap();
        assert_eq!(results.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn free_doc_invalidates_the_handle() {
        let r = registry();
        let doc_id = r.dispatch("parseHTML", json!({"html": "<p>x</p>"})).await.unwrap();
        assert_eq!(r.dispatch("freeDoc", json!({"docId": doc_id})).await.unwrap(), json!(true));
        let err = r.dispatch("domQueryOne", json!({"docId": doc_id, "selector": "p"})).await.unwrap_err();
        assert!(matches!(err, ReplError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn llm_query_on_null_callbacks_returns_sentinel() {
        let r = registry();
        let v = r.dispatch("llm_query", json!({"prompt": "x"})).await.unwrap();
        assert!(v.as_str().unwrap().starts_with("[SUB-CALL ERROR]"));
    }
}
