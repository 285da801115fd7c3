//! Context Builder (§4.3): assembles the next user turn's text from five
//! fixed-order sections, each present only if non-empty, and the constant
//! per-Task system prompt (main agent and sub-agent variants).

use rlm_types::task::PageChange;
use rlm_types::value::ValueDescriptor;

const REMINDER: &str = "Reminder: if you already know the answer, call setFinal(value) now instead of doing more exploration.";

/// Everything [`build_user_turn`] needs to compose one iteration's prompt.
pub struct ContextInput<'a> {
    /// §4.3 section 1 — already-assembled reinforcement block (user message
    /// + iteration count + progress list), built by `tracker::reinforcement_block`.
    pub reinforcement: &'a str,
    /// §4.3 section 2 — page changes since the last snapshot (Tab Diff).
    pub page_changes: &'a [PageChange],
    /// §4.3 section 3 — open tab count.
    pub tab_count: usize,
    /// §4.3 section 3 — currently active tab id, if any.
    pub active_tab_id: Option<&'a str>,
    /// §4.3 section 3 — REPL variable descriptors, name-ordered.
    pub variable_descriptors: &'a [(String, ValueDescriptor)],
    /// §4.3 section 4 — already-compacted history text (History Compactor's output).
    pub history_text: &'a str,
    /// Current 1-based iteration index, used to gate the §4.3 section 5 reminder
    /// (shown from iteration 2 onward).
    pub iteration: u32,
}

fn page_changes_section(changes: &[PageChange]) -> String {
    let mut out = String::from("## Page Changes\n");
    for c in changes {
        let field: &'static str = c.field.into();
        out.push_str(&format!("- {} {}: {:?} -> {:?}\n", c.tab_id, field, c.old, c.new));
    }
    out
}

fn environment_section(tab_count: usize, active_tab_id: Option<&str>, descriptors: &[(String, ValueDescriptor)]) -> String {
    let mut out = format!("## Environment\n{tab_count} open tab(s); active tab: {}\n", active_tab_id.unwrap_or("none"));
    if !descriptors.is_empty() {
        out.push_str("\nVariables:\n");
        for (name, descriptor) in descriptors {
            out.push_str(&format!("- {name}: {}\n", render_descriptor(descriptor)));
        }
    }
    out
}

/// Render a [`ValueDescriptor`] as the short textual form shown in a
/// prompt (variable listings, executed-block result metadata). Public so
/// `rlm-engine` can reuse it when composing a block's `code-result` metadata
/// string without duplicating the rendering rules.
pub fn render_descriptor(d: &ValueDescriptor) -> String {
    match d {
        ValueDescriptor::Primitive { type_name, preview } => format!("{type_name} = {preview}"),
        ValueDescriptor::StringDesc { length, preview } => format!("string(len={length}) \"{preview}\""),
        ValueDescriptor::ArrayDesc { length, element_schema } => match element_schema {
            Some(schema) => format!("array(len={length}) of {}", render_descriptor(schema)),
            None => format!("array(len={length})"),
        },
        ValueDescriptor::ObjectDesc { keys } => format!("object with keys [{}]", keys.join(", ")),
        ValueDescriptor::TruncatedDesc { original_length } => format!("<truncated, original {original_length} chars>"),
        ValueDescriptor::ErrorDesc { message } => format!("<error: {message}>"),
    }
}

/// Assemble the next per-iteration user turn (§4.3, §4.8 — "a single
/// per-iteration user message concatenates the sections").
pub fn build_user_turn(input: &ContextInput) -> String {
    let mut sections = vec![input.reinforcement.to_string()];

    if !input.page_changes.is_empty() {
        sections.push(page_changes_section(input.page_changes));
    }

    sections.push(environment_section(input.tab_count, input.active_tab_id, input.variable_descriptors));

    if !input.history_text.is_empty() {
        sections.push(format!("## Action History\n{}", input.history_text));
    }

    if input.iteration >= 2 {
        sections.push(REMINDER.to_string());
    }

    sections.join("\n\n")
}

const WORKED_EXAMPLE: &str = "Example trace:\n\
    ```repl\n\
    const tab = await openTab('https://example.com');\n\
    await waitForLoad(tab);\n\
    const text = await getText(tab);\n\
    env.pageChars = text.length;\n\
    log(`fetched ${text.length} chars`);\n\
    ```\n\
    ```repl\n\
    setFinal({ chars: env.pageChars });\n\
    ```";

/// The constant main-agent system prompt (§4.3, "System prompt" —
/// "specifies the API surface including return type sketches ... and a
/// small number of worked example traces").
pub fn main_system_prompt() -> String {
    format!(
        "You are an RLM (Recursive Language Model) agent. Write JavaScript in fenced `repl` \
         code blocks to accomplish the task; each block runs in a persistent sandbox whose \
         declarations survive into later blocks. Browser tabs are available as an external \
         variable surface. All calls below are async; await them.\n\
         \n\
         API surface:\n\
         {}\n\
         \n\
         `env` is a plain persistent object, not a function call — assign onto it directly \
         (e.g. `env.progress = 'fetched page 1'`) to leave yourself notes visible on later \
         iterations.\n\
         \n\
         {}\n\
         \n\
         Call setFinal(value) when the task is complete. Fence all code with ```repl ... ```.",
        crate::capability_surface_sketch(),
        WORKED_EXAMPLE,
    )
}

/// The constant sub-agent system prompt (§4.3 — "The sub-agent variant
/// omits recursion APIs and adds the rule that `__data` ... should not be
/// re-fetched").
pub fn sub_agent_system_prompt() -> String {
    format!(
        "You are a sub-agent RLM spawned to answer one focused sub-task. Write JavaScript in \
         fenced `repl` code blocks; recursion (`llm_query`/`llm_batch`) is disabled in this \
         context — calling them returns a `[SUB-CALL ERROR]` string. If `__data` is defined, \
         it is your input — use it directly rather than re-fetching it. `env` is a plain \
         persistent object (assign directly, e.g. `env.x = 1`), scoped to this sub-agent only.\n\
         \n\
         API surface:\n\
         {}\n\
         \n\
         {}\n\
         \n\
         Call setFinal(value) as soon as you know the answer. Fence all code with \
         ```repl ... ```.",
        crate::capability_surface_sketch(),
        WORKED_EXAMPLE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rlm_types::task::TabField;

    fn change(field: TabField) -> PageChange {
        PageChange { tab_id: "tab-0".into(), field, old: "a".into(), new: "b".into() }
    }

    #[test]
    fn omits_empty_sections() {
        let input = ContextInput {
            reinforcement: "## Task\nhi\n",
            page_changes: &[],
            tab_count: 1,
            active_tab_id: Some("tab-0"),
            variable_descriptors: &[],
            history_text: "",
            iteration: 1,
        };
        let out = build_user_turn(&input);
        assert!(!out.contains("Page Changes"));
        assert!(!out.contains("Action History"));
        assert!(!out.contains("Reminder"));
    }

    #[test]
    fn includes_page_changes_when_present() {
        let changes = [change(TabField::Url)];
        let input = ContextInput {
            reinforcement: "## Task\nhi\n",
            page_changes: &changes,
            tab_count: 1,
            active_tab_id: None,
            variable_descriptors: &[],
            history_text: "",
            iteration: 1,
        };
        assert!(build_user_turn(&input).contains("Page Changes"));
    }

    #[test]
    fn reminder_only_appears_from_iteration_two_onward() {
        let base = ContextInput {
            reinforcement: "## Task\nhi\n",
            page_changes: &[],
            tab_count: 0,
            active_tab_id: None,
            variable_descriptors: &[],
            history_text: "",
            iteration: 1,
        };
        assert!(!build_user_turn(&base).contains("Reminder"));

        let iter_two = ContextInput { iteration: 2, ..base };
        assert!(build_user_turn(&iter_two).contains("Reminder"));
    }

    #[test]
    fn system_prompts_differ_in_recursion_mention() {
        assert!(main_system_prompt().contains("Recursive Language Model"));
        assert!(sub_agent_system_prompt().contains("disabled"));
    }

    #[test]
    fn both_system_prompts_include_return_type_sketches_and_a_worked_example() {
        for prompt in [main_system_prompt(), sub_agent_system_prompt()] {
            assert!(prompt.contains("getText(tabId?) -> string"));
            assert!(prompt.contains("Example trace"));
            assert!(prompt.contains("setFinal"));
        }
    }
}
