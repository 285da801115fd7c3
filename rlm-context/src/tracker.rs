//! Task Tracker (§4.6): one-liner synthesis, the Task Reinforcement block,
//! and the sub-agent progress summary.
//!
//! The underlying `Vec<IterationRecord>` accumulation lives on `Task`
//! itself (`rlm-types::task::Task::iterations`); this module is the pure
//! derivation layer over that history, in the small-function style of
//! `_teacher_ref/neuron-context/src/strategies.rs`.

use rlm_types::task::{BlockResult, IterationRecord};

/// Keyword → human-readable phrase used by [`synthesize_iteration`]'s
/// mechanical one-liner scan. Order matters only for readability of the
/// joined summary, not for matching (every keyword present contributes).
const KEYWORDS: &[(&str, &str)] = &[
    ("setFinal", "called setFinal"),
    ("llm_batch", "ran a sub-agent batch"),
    ("llm_query", "queried a sub-agent"),
    ("execInTab", "executed in-tab code"),
    ("openTab", "opened a tab"),
    ("closeTab", "closed a tab"),
    ("navigate", "navigated"),
    ("waitForLoad", "waited for a page load"),
    ("waitForSelector", "waited for a selector"),
    ("click", "clicked an element"),
    ("type(", "typed text"),
    ("getText", "read page text"),
    ("getDOM", "read the DOM"),
    ("getLinks", "read page links"),
    ("parseHTML", "parsed HTML"),
    ("parsePage", "parsed a page"),
    ("sleep(", "slept"),
    ("log(", "logged a message"),
];

/// Mechanically derive a one-line intent summary for one executed code
/// block, by scanning for the REPL API calls it made (never by reading the
/// model's prose — the history must stay grounded in what actually ran).
pub fn one_liner(code: &str, has_error: bool) -> String {
    let mut phrases: Vec<&str> = KEYWORDS.iter().filter(|(needle, _)| code.contains(needle)).map(|(_, phrase)| *phrase).collect();
    phrases.dedup();
    let mut summary = if phrases.is_empty() { "ran code".to_string() } else { phrases.join(", ") };
    if has_error {
        summary.push_str(" (error)");
    }
    summary
}

/// Synthesize one iteration's one-liner from all of its executed blocks.
pub fn synthesize_iteration(blocks: &[BlockResult]) -> String {
    if blocks.is_empty() {
        return "no code generated".to_string();
    }
    blocks.iter().map(|b| one_liner(&b.code, b.is_error())).collect::<Vec<_>>().join("; ")
}

/// Build the Task Reinforcement block (§4.3 section 1): the user's original
/// message, the current iteration of the cap, and a progress list derived
/// from prior iterations' one-liners.
pub fn reinforcement_block(task_message: &str, iteration: u32, max_iterations: u32, prior_records: &[IterationRecord]) -> String {
    let mut out = format!("## Task\n{task_message}\n\nIteration {iteration} of {max_iterations}\n");
    if !prior_records.is_empty() {
        out.push_str("\nProgress so far:\n");
        for record in prior_records {
            out.push_str(&format!("- Iter {}: {}\n", record.index, record.one_liner));
        }
    }
    out
}

/// Concatenate the last three one-liners, for injecting into a sub-agent's
/// system prompt as its view of the parent task's progress (§4.1,
/// "parent task context").
pub fn sub_agent_progress_summary(prior_records: &[IterationRecord]) -> String {
    let start = prior_records.len().saturating_sub(3);
    prior_records[start..].iter().map(|r| r.one_liner.as_str()).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rlm_types::duration::DurationMs;

    fn block(code: &str, error: Option<&str>) -> BlockResult {
        BlockResult { code: code.to_string(), metadata: "void".to_string(), error: error.map(str::to_string) }
    }

    fn record(index: u32, one_liner: &str) -> IterationRecord {
        IterationRecord {
            index,
            started_at: DurationMs::ZERO,
            duration: DurationMs::ZERO,
            blocks: vec![],
            one_liner: one_liner.to_string(),
            full_metadata: String::new(),
            page_changes: vec![],
        }
    }

    #[test]
    fn one_liner_scans_for_known_keywords() {
        assert_eq!(one_liner("setFinal(42);", false), "called setFinal");
        assert_eq!(one_liner("const r = await openTab('https://x');", false), "opened a tab");
    }

    #[test]
    fn one_liner_appends_error_suffix() {
        assert_eq!(one_liner("click(id, '.btn');", true), "clicked an element (error)");
    }

    #[test]
    fn unrecognized_code_falls_back_to_ran_code() {
        assert_eq!(one_liner("const x = 1 + 1;", false), "ran code");
    }

    #[test]
    fn synthesize_iteration_joins_per_block_one_liners() {
        let blocks = vec![block("openTab('x')", None), block("click(id, '.a')", Some("boom"))];
        assert_eq!(synthesize_iteration(&blocks), "opened a tab; clicked an element (error)");
    }

    #[test]
    fn synthesize_iteration_with_no_blocks_reports_no_code() {
        assert_eq!(synthesize_iteration(&[]), "no code generated");
    }

    #[test]
    fn reinforcement_block_lists_prior_one_liners() {
        let prior = vec![record(1, "opened a tab"), record(2, "read page text")];
        let text = reinforcement_block("find the answer", 3, 25, &prior);
        assert!(text.contains("find the answer"));
        assert!(text.contains("Iteration 3 of 25"));
        assert!(text.contains("Iter 1: opened a tab"));
    }

    #[test]
    fn sub_agent_progress_summary_keeps_only_the_last_three() {
        let prior = vec![record(1, "a"), record(2, "b"), record(3, "c"), record(4, "d")];
        assert_eq!(sub_agent_progress_summary(&prior), "b c d");
    }
}
