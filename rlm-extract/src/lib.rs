#![deny(missing_docs)]
//! Multi-strategy code-block extraction from model text (§4.5).
//!
//! A deterministic fallback chain. Each strategy is tried in order; the
//! first strategy to produce a non-empty result wins. An empty result is
//! valid and signals the continuation path in the loop controller.

use regex::Regex;
use std::sync::LazyLock;

/// JS constructs recognized by the heuristic bare-code scan (strategy 4).
const HEURISTIC_PREFIXES: &[&str] = &[
    "const", "let", "var", "await", "return", "if", "for", "while", "try", "catch", "function",
    "class", "env.", "log(", "setFinal(", "//",
];

/// API identifiers whose presence on a line also qualifies it for the
/// heuristic scan, even without a recognized keyword prefix.
const KNOWN_API_IDENTIFIERS: &[&str] = &[
    "tabs", "activeTab", "openTab", "closeTab", "navigate", "switchTab", "waitForLoad",
    "waitForSelector", "execInTab", "getText", "getDOM", "getLinks", "getInputs",
    "querySelector", "querySelectorAll", "getSearchResults", "getWikiTables", "click", "type",
    "scroll", "parseHTML", "parsePage", "domQueryAll", "domQueryOne", "domQueryText", "freeDoc",
    "llm_query", "llm_batch", "sleep",
];

static FENCED_REPL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```repl\s*\n(.*?)```").unwrap());

static FENCED_ANY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z0-9_+-]*\s*\n(.*?)```").unwrap());

/// Extract the ordered list of executable code blocks from one model response.
///
/// Returns the first non-empty result of, in order: blocks fenced `repl`,
/// any fenced block, a JSON `"code"` field, or the heuristic bare-code scan.
pub fn extract_blocks(text: &str) -> Vec<String> {
    let by_repl_fence = extract_fenced(text, &FENCED_REPL);
    if !by_repl_fence.is_empty() {
        return by_repl_fence;
    }

    let by_any_fence = extract_fenced(text, &FENCED_ANY);
    if !by_any_fence.is_empty() {
        return by_any_fence;
    }

    if let Some(code) = extract_json_code_field(text) {
        if !code.trim().is_empty() {
            return vec![code];
        }
    }

    extract_heuristic(text)
}

fn extract_fenced(text: &str, re: &Regex) -> Vec<String> {
    re.captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Strategy 3: a JSON payload with a top-level `"code"` string field.
/// Tries the whole text as JSON first, then scans for an embedded `{...}`
/// object containing a `"code"` key.
fn extract_json_code_field(text: &str) -> Option<String> {
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(text.trim()) {
        if let Some(code) = v.get("code").and_then(|c| c.as_str()) {
            return Some(code.to_string());
        }
    }

    // Embedded: scan for the first balanced-brace JSON object in the text.
    for (start, _) in text.match_indices('{') {
        if let Some(obj_text) = balanced_brace_slice(&text[start..]) {
            if let Ok(v) = serde_json::from_str::<serde_json::Value>(obj_text) {
                if let Some(code) = v.get("code").and_then(|c| c.as_str()) {
                    return Some(code.to_string());
                }
            }
        }
    }
    None
}

/// Return the slice of `s` (which must start with `{`) up to and including
/// its matching closing brace, or `None` if unbalanced.
fn balanced_brace_slice(s: &str) -> Option<&str> {
    let mut depth = 0i32;
    for (i, ch) in s.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Strategy 4: scan lines for recognized JS constructs or known API calls,
/// joining adjacent matching lines (and blank/brace-continuation lines
/// between them) into a single block.
fn extract_heuristic(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let is_code_line = |line: &str| {
        let trimmed = line.trim_start();
        HEURISTIC_PREFIXES.iter().any(|p| trimmed.starts_with(p))
            || KNOWN_API_IDENTIFIERS.iter().any(|id| line.contains(id))
    };

    let mut matched: Vec<bool> = lines.iter().map(|l| is_code_line(l)).collect();

    // Join runs: a blank line or a lone closing-brace line between two
    // matched lines is absorbed into the run rather than splitting it.
    for i in 1..matched.len().saturating_sub(1) {
        if !matched[i] {
            let trimmed = lines[i].trim();
            let is_bridge = trimmed.is_empty() || trimmed.chars().all(|c| "{}();".contains(c));
            if is_bridge && matched[i - 1] && matched[i + 1] {
                matched[i] = true;
            }
        }
    }

    let mut blocks = Vec::new();
    let mut current = Vec::new();
    for (line, is_match) in lines.iter().zip(matched.iter()) {
        if *is_match {
            current.push(*line);
        } else if !current.is_empty() {
            blocks.push(current.join("\n"));
            current = Vec::new();
        }
    }
    if !current.is_empty() {
        blocks.push(current.join("\n"));
    }

    blocks.into_iter().map(|b| b.trim().to_string()).filter(|b| !b.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_a_single_repl_fenced_block() {
        let text = "Here's my plan:\n```repl\nsetFinal(\"hello\")\n```\nDone.";
        assert_eq!(extract_blocks(text), vec!["setFinal(\"hello\")"]);
    }

    #[test]
    fn extracts_multiple_repl_fenced_blocks_in_order() {
        let text = "```repl\nconst x = 1;\n```\nsome prose\n```repl\nsetFinal(x)\n```";
        assert_eq!(extract_blocks(text), vec!["const x = 1;", "setFinal(x)"]);
    }

    #[test]
    fn falls_back_to_any_fence_when_no_repl_tag() {
        let text = "```js\nsetFinal(42)\n```";
        assert_eq!(extract_blocks(text), vec!["setFinal(42)"]);
    }

    #[test]
    fn prefers_repl_fence_over_untagged_fence() {
        let text = "```\nwrong\n```\n```repl\nright\n```";
        assert_eq!(extract_blocks(text), vec!["right"]);
    }

    #[test]
    fn falls_back_to_json_code_field() {
        let text = r#"{"code": "setFinal(1)"}"#;
        assert_eq!(extract_blocks(text), vec!["setFinal(1)"]);
    }

    #[test]
    fn falls_back_to_json_code_field_embedded_in_prose() {
        let text = r#"Sure, here: {"code": "setFinal(1)", "note": "done"} thanks"#;
        assert_eq!(extract_blocks(text), vec!["setFinal(1)"]);
    }

    #[test]
    fn falls_back_to_heuristic_bare_code_scan() {
        let text = "I'll do this:\nconst x = 1;\nsetFinal(x);\nThat's it.";
        let blocks = extract_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].contains("const x = 1;"));
        assert!(blocks[0].contains("setFinal(x);"));
    }

    #[test]
    fn prose_only_response_yields_no_blocks() {
        let text = "I think the answer is probably around forty two, let me consider more.";
        assert!(extract_blocks(text).is_empty());
    }

    #[test]
    fn empty_text_yields_no_blocks() {
        assert!(extract_blocks("").is_empty());
    }

    #[test]
    fn heuristic_joins_blank_line_continuations() {
        let text = "const x = 1;\n\nsetFinal(x);";
        let blocks = extract_blocks(text);
        assert_eq!(blocks.len(), 1);
    }
}
