//! Set-difference comparison for label observations.

use super::{ChangeResult, Delta, DetectOptions, ItemDelta};
use crate::observation::LabelSet;

/// Compare two label sets.
///
/// Only the appearance of new labels is notable ("a new category became
/// available"); disappeared labels are gathered on request but never
/// trigger a change on their own.
pub(crate) fn diff_labels(
    baseline: &LabelSet,
    current: &LabelSet,
    opts: &DetectOptions,
) -> ChangeResult {
    let added = current.difference(baseline);
    let removed = if opts.report_removed {
        baseline.difference(current)
    } else {
        Vec::new()
    };

    if added.is_empty() {
        return ChangeResult::unchanged();
    }

    ChangeResult {
        changed: true,
        delta: Delta::Labels(ItemDelta { added, removed }),
        artifact: None,
    }
}
