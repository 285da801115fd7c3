//! Tab Diff (§4.7): snapshot-to-snapshot change detection for open tabs.

use rlm_types::task::{PageChange, Snapshot, TabField};

/// Tracks the last captured [`Snapshot`] and diffs a new one against it.
///
/// Tabs present in only one side of the comparison are ignored — creation
/// and closure are not page changes (§4.7).
#[derive(Default)]
pub struct TabDiffTracker {
    last: Option<Snapshot>,
}

impl TabDiffTracker {
    /// Construct a tracker with no prior snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff `current` against the last captured snapshot, then store
    /// `current` as the new baseline for the next call.
    pub fn diff(&mut self, current: &Snapshot) -> Vec<PageChange> {
        let mut changes = Vec::new();
        if let Some(last) = &self.last {
            for (tab_id, state) in current {
                let Some(prev) = last.get(tab_id) else { continue };
                if prev.url != state.url {
                    changes.push(PageChange { tab_id: tab_id.clone(), field: TabField::Url, old: prev.url.clone(), new: state.url.clone() });
                }
                if prev.title != state.title {
                    changes.push(PageChange { tab_id: tab_id.clone(), field: TabField::Title, old: prev.title.clone(), new: state.title.clone() });
                }
                if prev.status != state.status {
                    changes.push(PageChange { tab_id: tab_id.clone(), field: TabField::Status, old: prev.status.clone(), new: state.status.clone() });
                }
            }
        }
        self.last = Some(current.clone());
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rlm_types::task::TabState;

    fn snapshot(entries: &[(&str, &str, &str, &str)]) -> Snapshot {
        entries
            .iter()
            .map(|(id, url, title, status)| {
                (id.to_string(), TabState { url: url.to_string(), title: title.to_string(), status: status.to_string() })
            })
            .collect()
    }

    #[test]
    fn first_diff_against_no_prior_snapshot_is_empty() {
        let mut tracker = TabDiffTracker::new();
        let changes = tracker.diff(&snapshot(&[("tab-0", "https://a.test", "A", "complete")]));
        assert!(changes.is_empty());
    }

    #[test]
    fn detects_url_and_title_changes_on_a_shared_tab() {
        let mut tracker = TabDiffTracker::new();
        tracker.diff(&snapshot(&[("tab-0", "https://a.test", "A", "complete")]));
        let changes = tracker.diff(&snapshot(&[("tab-0", "https://b.test", "B", "complete")]));
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().any(|c| matches!(c.field, TabField::Url)));
        assert!(changes.iter().any(|c| matches!(c.field, TabField::Title)));
    }

    #[test]
    fn new_or_closed_tabs_produce_no_page_changes() {
        let mut tracker = TabDiffTracker::new();
        tracker.diff(&snapshot(&[("tab-0", "https://a.test", "A", "complete")]));
        let changes = tracker.diff(&snapshot(&[("tab-0", "https://a.test", "A", "complete"), ("tab-1", "https://c.test", "C", "complete")]));
        assert!(changes.is_empty());
    }

    #[test]
    fn unchanged_snapshot_produces_no_changes() {
        let mut tracker = TabDiffTracker::new();
        let snap = snapshot(&[("tab-0", "https://a.test", "A", "complete")]);
        tracker.diff(&snap);
        assert!(tracker.diff(&snap).is_empty());
    }
}
