#![deny(missing_docs)]
//! Context Builder, History Compactor, Task Tracker, and Tab Diff (§4.3,
//! §4.4, §4.6, §4.7): everything that turns accumulated `Task` state into
//! the next prompt's text, independent of how that state was produced.
//!
//! Deliberately synchronous and dependency-light (`rlm-types` + `serde_json`
//! only) — every function here is a pure transform over already-collected
//! data, mirroring `_teacher_ref/neuron-turn/src/context.rs`'s synchronous
//! `ContextStrategy` shape rather than the async RPITIT one in
//! `_teacher_ref/neuron-context`.

pub mod compactor;
pub mod context_builder;
pub mod descriptor;
pub mod tab_diff;
pub mod tracker;

pub use compactor::compact;
pub use context_builder::{build_user_turn, main_system_prompt, sub_agent_system_prompt, ContextInput};
pub use descriptor::describe;
pub use tab_diff::TabDiffTracker;
pub use tracker::{one_liner, reinforcement_block, sub_agent_progress_summary, synthesize_iteration};

/// The exposed capability names (§4.2's table), listed here only for
/// embedding in the constant system prompts — the authoritative list a
/// REPL actually binds lives in `rlm-repl::CAPABILITY_NAMES`, kept in sync
/// by hand since this crate does not depend on `rlm-repl`. `env` is
/// deliberately excluded: it is a persistent object, not a dispatched
/// capability function (see [`context_builder`]'s system prompts).
pub(crate) fn capability_names_hint() -> &'static str {
    "tabs, activeTab, openTab, closeTab, navigate, switchTab, waitForLoad, waitForSelector, \
     execInTab, getText, getDOM, getLinks, getInputs, querySelector, querySelectorAll, \
     getSearchResults, getWikiTables, click, type, scroll, parseHTML, parsePage, domQueryAll, \
     domQueryOne, domQueryText, freeDoc, llm_query, llm_batch, setFinal, log, sleep"
}

/// Return-type sketch for each capability (§4.3, "the system prompt
/// specifies the API surface including return type sketches"). Kept
/// alongside [`capability_names_hint`] rather than merged into it — the
/// hint is also used where a flat name list reads better.
pub(crate) fn capability_surface_sketch() -> &'static str {
    "- tabs() -> [{id, url, title, status, favicon}]\n\
     - activeTab() -> tabId | null\n\
     - openTab(url?) -> tabId\n\
     - closeTab(tabId) -> void\n\
     - navigate(tabId?, url) -> void\n\
     - switchTab(tabId) -> void\n\
     - waitForLoad(tabId?, timeoutMs?) -> void\n\
     - waitForSelector(tabId?, selector, timeoutMs?) -> void\n\
     - execInTab(tabId?, code) -> any\n\
     - getText(tabId?) -> string\n\
     - getDOM(tabId?) -> string\n\
     - getLinks(tabId?) -> [{href, text}]\n\
     - getInputs(tabId?) -> [{name, type, value}]\n\
     - querySelector(tabId?, selector) -> string | null\n\
     - querySelectorAll(tabId?, selector) -> [string]\n\
     - getSearchResults(tabId?) -> [{title, href}]\n\
     - getWikiTables(tabId?) -> [string]\n\
     - click(tabId?, selector) -> true\n\
     - type(tabId?, selector, text) -> true\n\
     - scroll(tabId?, dx, dy) -> void\n\
     - parseHTML(html) -> docId\n\
     - parsePage(tabId?) -> docId\n\
     - domQueryAll(docId, selector) -> [string]\n\
     - domQueryOne(docId, selector) -> string | null\n\
     - domQueryText(docId, selector) -> string\n\
     - freeDoc(docId) -> boolean\n\
     - llm_query(prompt, data?) -> string\n\
     - llm_batch(prompts) -> [{status: 'fulfilled', value} | {status: 'rejected', error}]\n\
     - setFinal(value) -> void\n\
     - log(message) -> void\n\
     - sleep(ms) -> void"
}
