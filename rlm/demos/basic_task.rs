//! End-to-end wiring demo: submits one Task to an [`Engine`] backed by the
//! scripted driver/model test doubles and prints every event it emits.
//!
//! Run with `cargo run --bin demo-basic-task` (once a real provider/driver
//! pair replaces the scripted doubles below, this is the shape an embedder
//! wires up against its own transports).

use std::sync::Arc;

use rlm::prelude::*;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let driver: Arc<dyn BrowserDriver> = Arc::new(ScriptedBrowserDriver::new("https://example.com", vec![]));
    let model = ScriptedModelClient::new(vec![
        Ok(r#"```repl
const tab = await openTab("https://example.com/search?q=rust");
const title = await getText(tab, "h1");
log(`landed on: ${title}`);
```"#
            .to_string()),
        Ok(r#"```repl
setFinal({ answer: "done", title: "h1 text" });
```"#
            .to_string()),
    ]);

    let config = rlm::default_config(ProviderKind::AnthropicStyle, SecretString::new("sk-demo"), "claude-sonnet-4-20250514");
    let engine = Engine::new(config, model, driver);

    let mut events = engine.submit_task("Search example.com and report the page title").await.expect("engine accepts the task");

    while let Some(event) = events.recv().await {
        match &event {
            EngineEvent::Complete { final_value } => {
                tracing::info!(?final_value, "task finished");
            }
            other => tracing::info!(?other, "event"),
        }
    }

    let state = engine.get_state().await;
    tracing::info!(status = ?state.status, "final task state");
}
