//! Line-membership comparison for text observations.

use super::{ChangeResult, Delta, DetectOptions, ItemDelta};
use crate::observation::TextLines;
use std::collections::HashSet;

/// Compare two line lists by membership, not position.
///
/// A line that merely moved is not a change; only lines absent from the
/// baseline count. The driving domain cares about newly appeared content,
/// so removals are informational and only gathered on request.
pub(crate) fn diff_lines(
    baseline: &TextLines,
    current: &TextLines,
    opts: &DetectOptions,
) -> ChangeResult {
    let added = missing_from(current.lines(), baseline.lines());
    let removed = if opts.report_removed {
        missing_from(baseline.lines(), current.lines())
    } else {
        Vec::new()
    };

    if added.is_empty() {
        return ChangeResult::unchanged();
    }

    ChangeResult {
        changed: true,
        delta: Delta::Text(ItemDelta { added, removed }),
        artifact: None,
    }
}

/// Lines of `from` not present in `other`, deduplicated, in first-seen order.
fn missing_from(from: &[String], other: &[String]) -> Vec<String> {
    let known: HashSet<&str> = other.iter().map(String::as_str).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    from.iter()
        .filter(|l| !known.contains(l.as_str()) && seen.insert(l.as_str()))
        .cloned()
        .collect()
}
