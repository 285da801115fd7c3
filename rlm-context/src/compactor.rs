//! History Compactor (§4.4): token-budgeted adaptive compaction of the
//! Task's iteration history into the next prompt's Action History section.
//!
//! Grounded on `_teacher_ref/neuron-context/src/strategies.rs`'s
//! `SlidingWindowStrategy`/`ToolResultClearingStrategy` pair — a
//! token-threshold trigger plus a keep-recent-N/condense-the-rest body —
//! generalized from "keep N *messages*" to "keep N *iteration records*,
//! condensing the rest to one-liners" since this spec has no separate
//! tool-result concept to clear independently of the rest of the turn.

use rlm_types::config::{HISTORY_COMPACT_THRESHOLD, HISTORY_TOKEN_BUDGET};
use rlm_types::task::IterationRecord;

fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

fn join_full(records: &[IterationRecord]) -> String {
    records.iter().map(|r| r.full_metadata.as_str()).collect::<Vec<_>>().join("\n")
}

fn condensed_line(record: &IterationRecord) -> String {
    format!("Iter {}: {}", record.index, record.one_liner)
}

/// Produce the Action History text for the next prompt (§4.3 section 4).
///
/// 1. Concatenate every record's `full_metadata`; estimate `ceil(chars/4)` tokens.
/// 2. If that's within [`HISTORY_COMPACT_THRESHOLD`] of [`HISTORY_TOKEN_BUDGET`], return it unchanged.
/// 3. Otherwise keep the last `min(3, total)` records verbatim, condensing older ones to one-liners.
/// 4. If still over budget, truncate the condensed prefix further, preserving the recent verbatim tail.
pub fn compact(records: &[IterationRecord]) -> String {
    if records.is_empty() {
        return String::new();
    }

    let full = join_full(records);
    let full_tokens = estimate_tokens(&full);
    let threshold = (HISTORY_TOKEN_BUDGET as f64 * HISTORY_COMPACT_THRESHOLD) as usize;
    if full_tokens <= threshold {
        return full;
    }

    let keep_n = records.len().min(3);
    let split_at = records.len() - keep_n;
    let (older, recent) = records.split_at(split_at);

    let condensed: Vec<String> = older.iter().map(condensed_line).collect();
    let mut condensed_text = condensed.join("\n");
    let recent_text = join_full(recent);

    let combined = format!("{condensed_text}\n{recent_text}");
    if estimate_tokens(&combined) <= HISTORY_TOKEN_BUDGET as usize {
        return combined;
    }

    // Still over budget: shrink the condensed prefix, keeping the tail
    // closest to `recent` (the oldest condensed lines are dropped first).
    let recent_tokens = estimate_tokens(&recent_text);
    let condensed_char_budget = HISTORY_TOKEN_BUDGET.saturating_sub(recent_tokens as u64) as usize * 4;
    if condensed_text.chars().count() > condensed_char_budget {
        let skip = condensed_text.chars().count() - condensed_char_budget;
        condensed_text = condensed_text.chars().skip(skip).collect();
    }
    format!("{condensed_text}\n{recent_text}")
}
