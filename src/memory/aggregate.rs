//! Context packing under a character budget.
//!
//! The correctness-critical piece of the memory store: entries from the
//! requested layers are rendered one line each and packed whole, highest
//! priority first, until the budget is reached. The output never exceeds
//! the budget and never contains a partial entry.

use crate::models::MemoryEntry;

/// Packs entries into a single bounded context blob.
///
/// Priority is `importance_score` descending, then `created_at` descending.
/// Remaining ties keep the input order (the store feeds entries in
/// most-recent-insertion-first order, so later insertions win). Dropping is
/// strictly lowest-priority-first: the result is always the longest prefix
/// of the priority ordering that fits.
///
/// `budget_chars` counts Unicode scalar values, including the joining
/// newlines. An entry whose rendered line alone exceeds the remaining
/// budget is dropped whole.
#[must_use]
pub fn pack_entries(entries: &[MemoryEntry], budget_chars: usize) -> String {
    if entries.is_empty() || budget_chars == 0 {
        return String::new();
    }

    let mut prioritized: Vec<&MemoryEntry> = entries.iter().collect();
    // Stable sort: full ties keep input order.
    prioritized.sort_by(|a, b| {
        b.importance_score
            .total_cmp(&a.importance_score)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });

    let lines: Vec<String> = prioritized.iter().map(|e| e.render()).collect();

    // Longest prefix of the priority order that fits the budget, counting
    // one newline between consecutive kept lines.
    let mut kept = 0;
    let mut total = 0usize;
    for line in &lines {
        let line_chars = line.chars().count();
        let separator = usize::from(kept > 0);
        if total + separator + line_chars > budget_chars {
            break;
        }
        total += separator + line_chars;
        kept += 1;
    }

    lines[..kept].join("\n")
}
