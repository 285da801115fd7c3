//! The sandboxed evaluator (§4.2's `execute` algorithm), wrapping an
//! `rquickjs::AsyncContext`.
//!
//! Rather than bind one native function per capability, a single native
//! async function — `__dispatch(name, argsJson)` — crosses the Rust/JS
//! boundary. A small JS preamble, generated from [`CAPABILITY_NAMES`],
//! defines the names user code actually sees as thin wrappers that
//! JSON-encode their arguments and JSON-decode the result. This keeps the
//! FFI surface to one narrowly-typed function instead of thirty, at the
//! cost of a JSON round trip even primitives have to pay.

use crate::callbacks::EngineCallbacks;
use crate::capability::{CapabilityRegistry, CAPABILITY_NAMES};
use crate::error::ReplError;
use crate::hoist::{hoist, predeclare_statement, HoistResult};
use rlm_driver::browser::BrowserDriver;
use rlm_types::config::{EXEC_RESULT_CAP, EXEC_TIMEOUT_MS, ISOLATE_MEMORY_LIMIT_BYTES};
use rlm_types::value::ReplValue;
use rquickjs::function::Async;
use rquickjs::{AsyncContext, AsyncRuntime};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn capability_preamble() -> String {
    let mut out = String::new();
    for name in CAPABILITY_NAMES {
        out.push_str(&format!(
            "globalThis.{name} = async (...__a) => {{\n\
             \tconst __raw = await __dispatch({name:?}, JSON.stringify(__a.length <= 1 ? (__a[0] ?? null) : __a));\n\
             \tconst __v = JSON.parse(__raw);\n\
             \tif (__v && typeof __v === 'object' && __v.__dispatch_error__) {{ throw new Error(__v.__dispatch_error__); }}\n\
             \treturn __v;\n\
             }};\n"
        ));
    }
    out
}

/// One REPL's persistent JS state: a QuickJS context plus the host
/// capability registry bound into it.
///
/// Persists for a Task's entire lifetime (§3, "REPL state persists across
/// iterations") — a `Sandbox` is constructed once per Task (and once more
/// per sub-agent call, via a fresh registry built with
/// [`crate::callbacks::SubAgentCallbacks`]) and `execute()` is called once
/// per extracted code block thereafter.
pub struct Sandbox<C: EngineCallbacks + 'static> {
    runtime: AsyncRuntime,
    context: AsyncContext,
    registry: Arc<CapabilityRegistry<C>>,
    hoisted_names: Mutex<Vec<String>>,
}

impl<C: EngineCallbacks + 'static> Sandbox<C> {
    /// Construct a fresh sandbox, capped at [`ISOLATE_MEMORY_LIMIT_BYTES`],
    /// with the host capability surface bound into its global scope.
    pub async fn new(driver: Arc<dyn BrowserDriver>, callbacks: Arc<C>) -> Result<Self, ReplError> {
        let runtime = AsyncRuntime::new().map_err(|e| ReplError::Other(Box::new(e)))?;
        runtime.set_memory_limit(ISOLATE_MEMORY_LIMIT_BYTES as usize).await;
        let context = AsyncContext::full(&runtime)
            .await
            .map_err(|e| ReplError::Other(Box::new(e)))?;
        let registry = Arc::new(CapabilityRegistry::new(driver, callbacks));

        Self::bind_dispatch(&context, Arc::clone(&registry)).await?;
        Self::init_env(&context).await?;

        Ok(Self { runtime, context, registry, hoisted_names: Mutex::new(Vec::new()) })
    }

    /// Seed the persistent `env` record (§3, "a distinguished `env` record
    /// for user variables"). Unlike every other capability name, `env` is a
    /// plain mutable object users assign properties onto directly
    /// (`env.x = 1`), not a host function — so it is set up once here
    /// rather than routed through [`CAPABILITY_NAMES`]/`__dispatch`.
    async fn init_env(context: &AsyncContext) -> Result<(), ReplError> {
        context
            .with(|ctx| ctx.eval::<(), _>("globalThis.env = {};".as_bytes()))
            .await
            .map_err(|e| ReplError::Other(Box::new(e)))
    }

    async fn bind_dispatch(context: &AsyncContext, registry: Arc<CapabilityRegistry<C>>) -> Result<(), ReplError> {
        context
            .with(|ctx| {
                let registry = Arc::clone(&registry);
                let dispatch = Async(move |name: String, args_json: String| {
                    let registry = Arc::clone(&registry);
                    async move {
                        let args: serde_json::Value =
                            serde_json::from_str(&args_json).unwrap_or(serde_json::Value::Null);
                        match registry.dispatch(&name, args).await {
                            Ok(v) => serde_json::to_string(&v).unwrap_or_else(|_| "null".to_string()),
                            Err(e) => {
                                serde_json::to_string(&serde_json::json!({ "__dispatch_error__": e.to_string() }))
                                    .unwrap_or_else(|_| "null".to_string())
                            }
                        }
                    }
                });
                ctx.globals().set("__dispatch", rquickjs::Function::new(ctx.clone(), dispatch)?)?;
                ctx.eval::<(), _>(capability_preamble().as_bytes())
            })
            .await
            .map_err(|e| ReplError::Other(Box::new(e)))
    }

    /// Run one extracted code block to completion.
    ///
    /// 1. Reset `final_called` state (a fresh [`CapabilityRegistry::take_final`] slate).
    /// 2. Hoist top-level declarations so they survive into the next `execute()` call.
    /// 3. Wrap in `(async () => { ... })()` and run under a 30s timeout.
    /// 4. Cap the JSON-serialized result at [`EXEC_RESULT_CAP`] characters.
    /// 5. Capture a thrown error as the `{__rlm_error}` sentinel rather than propagating it.
    pub async fn execute(&self, code: &str) -> ReplValue {
        self.registry.take_final();

        let HoistResult { rewritten, names } = hoist(code);
        {
            let mut hoisted = self.hoisted_names.lock().unwrap();
            for n in names {
                if !hoisted.contains(&n) {
                    hoisted.push(n);
                }
            }
        }
        let predecl = predeclare_statement(&self.hoisted_names.lock().unwrap());

        // `eval(...)` here is a *direct* eval (called by its bare name, not
        // through an alias) — spec-wise that means it both inherits `await`
        // legality from the enclosing async arrow and resolves to the
        // evaluated code's last-statement completion value, which a plain
        // block body would otherwise discard without an explicit `return`.
        let code_json = serde_json::to_string(&rewritten).unwrap_or_else(|_| "\"\"".to_string());
        let wrapped = format!(
            "{predecl}\n\
             globalThis.__rlm_result = undefined;\n\
             (async () => {{\n\treturn eval({code_json});\n}})().then(\n\
             \t(v) => {{ globalThis.__rlm_result = JSON.stringify(v === undefined ? null : v); }},\n\
             \t(e) => {{ globalThis.__rlm_result = JSON.stringify({{ __rlm_error: true, message: String(e && e.message || e), stack: (e && e.stack) ? String(e.stack).slice(0, 500) : null }}); }}\n\
             );"
        );

        let run = async {
            self.context
                .with(|ctx| ctx.eval::<(), _>(wrapped.as_bytes()))
                .await
                .map_err(|e| ReplError::Other(Box::new(e)))?;
            self.runtime.idle().await;
            self.context
                .with(|ctx| ctx.globals().get::<_, Option<String>>("__rlm_result"))
                .await
                .map_err(|e| ReplError::Other(Box::new(e)))
        };

        match tokio::time::timeout(Duration::from_millis(EXEC_TIMEOUT_MS), run).await {
            Err(_) => ReplValue::rlm_error(format!("execution timed out after {EXEC_TIMEOUT_MS}ms"), None),
            Ok(Err(e)) => ReplValue::rlm_error(e.to_string(), None),
            Ok(Ok(raw)) => Self::parse_capped(raw.unwrap_or_else(|| "null".to_string())),
        }
    }

    fn parse_capped(raw: String) -> ReplValue {
        if raw.chars().count() > EXEC_RESULT_CAP {
            let original_length = raw.chars().count();
            let head: String = raw.chars().take(EXEC_RESULT_CAP).collect();
            return ReplValue::truncated(original_length, head);
        }
        serde_json::from_str(&raw).unwrap_or(ReplValue::Null)
    }

    /// The value passed to `setFinal()` during the most recent `execute()`
    /// call, if any (§4.1 step 8 — checked by the loop controller after
    /// every executed block, not just the last one in an iteration).
    pub fn take_final(&self) -> Option<serde_json::Value> {
        self.registry.take_final()
    }

    /// Names hoisted so far across this Task's `execute()` calls — the
    /// REPL's persistent top-level bindings (§3, "REPL State"). The loop
    /// controller reads this to build each iteration's variable-descriptor
    /// listing without needing its own name-tracking.
    pub fn hoisted_names(&self) -> Vec<String> {
        self.hoisted_names.lock().unwrap().clone()
    }

    /// A snapshot of the persistent `env` record's own properties, for the
    /// loop controller's per-iteration `env.*` metadata enumeration
    /// (§4.2). Falls back to an empty object on any evaluation failure
    /// rather than propagating — this is best-effort metadata, not a
    /// correctness-critical read.
    pub async fn env_snapshot(&self) -> ReplValue {
        let raw = self.context.with(|ctx| ctx.eval::<String, _>("JSON.stringify(globalThis.env)".as_bytes())).await;
        match raw {
            Ok(json) => Self::parse_capped(json),
            Err(_) => ReplValue::Object(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::NullCallbacks;
    use rlm_driver::browser::ScriptedBrowserDriver;

    async fn sandbox() -> Sandbox<NullCallbacks> {
        let driver = Arc::new(ScriptedBrowserDriver::new("https://example.com", vec![]));
        Sandbox::new(driver, Arc::new(NullCallbacks)).await.unwrap()
    }

    #[tokio::test]
    async fn executes_a_plain_expression_and_returns_its_value() {
        let s = sandbox().await;
        let v = s.execute("1 + 1").await;
        assert_eq!(v, ReplValue::Number(2.0));
    }

    #[tokio::test]
    async fn declarations_persist_across_separate_execute_calls() {
        let s = sandbox().await;
        s.execute("const counter = 1;").await;
        let v = s.execute("counter + 1").await;
        assert_eq!(v, ReplValue::Number(2.0));
    }

    #[tokio::test]
    async fn a_thrown_error_is_captured_as_the_rlm_error_sentinel() {
        let s = sandbox().await;
        let v = s.execute("throw new Error('boom');").await;
        assert!(v.is_error());
    }

    #[tokio::test]
    async fn set_final_is_visible_via_take_final_after_execute() {
        let s = sandbox().await;
        s.execute("setFinal(7);").await;
        assert_eq!(s.take_final(), Some(serde_json::json!(7)));
    }

    #[tokio::test]
    async fn log_forwards_through_callbacks_without_erroring() {
        let s = sandbox().await;
        let v = s.execute("log('hello'); 'done'").await;
        assert_eq!(v, ReplValue::String("done".to_string()));
    }

    #[tokio::test]
    async fn env_assignments_persist_across_execute_calls_and_are_snapshotted() {
        let s = sandbox().await;
        s.execute("env.x = 1;").await;
        s.execute("env.y = 'hi';").await;
        match s.env_snapshot().await {
            ReplValue::Object(entries) => {
                assert_eq!(entries.len(), 2);
                assert!(entries.contains(&("x".to_string(), ReplValue::Number(1.0))));
                assert!(entries.contains(&("y".to_string(), ReplValue::String("hi".to_string()))));
            }
            other => panic!("expected ReplValue::Object, got {other:?}"),
        }
    }
}
