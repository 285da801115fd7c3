//! Small shared helpers with no state of their own.

/// Truncate `s` to at most `max` `char`s, matching the truncation rule
/// used throughout §4 for event previews (sub-call prompts/results capped
/// at `PREVIEW_MAX_CHARS`).
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_short_strings_untouched() {
        assert_eq!(truncate_chars("hi", 10), "hi");
    }

    #[test]
    fn truncates_long_strings_to_the_char_limit() {
        let long = "x".repeat(500);
        assert_eq!(truncate_chars(&long, 400).chars().count(), 400);
    }
}
