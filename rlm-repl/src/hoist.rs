//! Declaration hoisting (§4.2, step 2).
//!
//! Scans top-level `const`/`let`/`var NAME = ...` declarations, excluding
//! those inside `for (...)` headers, and rewrites them to plain
//! assignments against a pre-declared `var NAME` at global scope. This is
//! what lets a user's `const x = 1;` in iteration 1 still be visible as
//! `x` in iteration 5 — the underlying JS engine would otherwise scope a
//! `const`/`let` to the wrapping `(async () => {...})()` call.
//!
//! This is a text-based transform, not a tokenizer-level pass (§9's first
//! Open Question is accepted as specified rather than "fixed" here): it
//! can misfire on a `const`/`let`/`var` token that appears inside a
//! template string or comment. A faithful tokenizer-level rewrite is
//! future work, not attempted in this crate.

use regex::Regex;
use std::sync::LazyLock;

static TOP_LEVEL_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(\s*)(const|let|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*=").unwrap()
});

static FOR_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*for\s*\(\s*(const|let|var)\s").unwrap()
});

/// The result of hoisting: the rewritten code plus the list of names that
/// were hoisted, in declaration order (first occurrence wins for dupes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoistResult {
    /// Code rewritten so each hoisted declaration is a plain assignment.
    pub rewritten: String,
    /// Names that were hoisted, in first-seen order.
    pub names: Vec<String>,
}

/// Hoist top-level declarations in `code`.
///
/// A line is considered "inside a `for (...)` header" and left untouched
/// if it matches `^\s*for\s*\(\s*(const|let|var)\s` — the common case of
/// `for (const x of xs)` / `for (let i = 0; ...)`.
pub fn hoist(code: &str) -> HoistResult {
    let mut names = Vec::new();
    let mut seen = std::collections::HashSet::new();

    let rewritten = TOP_LEVEL_DECL
        .replace_all(code, |caps: &regex::Captures| {
            let full_match_start = caps.get(0).unwrap().start();
            let line_start = code[..full_match_start].rfind('\n').map(|i| i + 1).unwrap_or(0);
            let line_end = code[full_match_start..].find('\n').map(|i| full_match_start + i).unwrap_or(code.len());
            let line = &code[line_start..line_end];

            if FOR_HEADER.is_match(line) {
                return caps.get(0).unwrap().as_str().to_string();
            }

            let indent = &caps[1];
            let name = &caps[3];
            if seen.insert(name.to_string()) {
                names.push(name.to_string());
            }
            format!("{indent}{name} =")
        })
        .into_owned();

    HoistResult { rewritten, names }
}

/// Render the `var NAME;` pre-declarations a hoisted script needs,
/// joined by newlines. Emitted once, before the hoisted/rewritten code,
/// each Task's first execution (subsequent executions reuse the same
/// global scope so re-declaring is harmless but unnecessary).
pub fn predeclare_statement(names: &[String]) -> String {
    names.iter().map(|n| format!("var {n};")).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hoists_a_single_const_declaration() {
        let r = hoist("const x = 1;");
        assert_eq!(r.names, vec!["x"]);
        assert_eq!(r.rewritten, "x = 1;");
    }

    #[test]
    fn hoists_let_and_var_too() {
        assert_eq!(hoist("let y = 2;").names, vec!["y"]);
        assert_eq!(hoist("var z = 3;").names, vec!["z"]);
    }

    #[test]
    fn leaves_for_loop_headers_untouched() {
        let code = "for (const item of items) {\n  log(item);\n}";
        let r = hoist(code);
        assert!(r.names.is_empty());
        assert_eq!(r.rewritten, code);
    }

    #[test]
    fn hoists_multiple_declarations_in_order() {
        let r = hoist("const a = 1;\nconst b = 2;\nsetFinal(a + b);");
        assert_eq!(r.names, vec!["a", "b"]);
        assert_eq!(r.rewritten, "a = 1;\nb = 2;\nsetFinal(a + b);");
    }

    #[test]
    fn deduplicates_repeated_names() {
        let r = hoist("const a = 1;\na = 2;\nconst a = 3;");
        assert_eq!(r.names, vec!["a"]);
    }

    #[test]
    fn predeclare_statement_renders_var_per_name() {
        let s = predeclare_statement(&["a".to_string(), "b".to_string()]);
        assert_eq!(s, "var a;\nvar b;");
    }

    #[test]
    fn code_with_no_declarations_is_unchanged() {
        let r = hoist("setFinal(42);");
        assert!(r.names.is_empty());
        assert_eq!(r.rewritten, "setFinal(42);");
    }
}
