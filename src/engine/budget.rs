//! Token-budget application and pruning order:
//! drop lowest-ranked items, then collapse verbose fields, then drop
//! optional drilldown sections, in that order, recording each drop as a
//! `Truncation` on the provenance.

use crate::engine::provenance::ProvenanceBuilder;
use crate::types::TokenBudget;

/// Rough token estimate: ~4 characters per token, a cheap heuristic good
/// enough for budget pruning decisions on text payloads.
pub fn estimate_tokens(text: &str) -> u32 {
    (text.len() as u32 / 4).max(1)
}

/// Truncate `items` (already ranked best-first) to fit within `budget`,
/// given a per-item token cost function. Returns the kept items; the number
/// dropped is recorded on `provenance` under `field`.
pub fn truncate_to_budget<T>(
    items: Vec<T>,
    budget: TokenBudget,
    reserved_tokens: u32,
    cost_fn: impl Fn(&T) -> u32,
    field: &str,
    provenance: &mut ProvenanceBuilder,
) -> Vec<T> {
    let mut remaining = budget.get().saturating_sub(reserved_tokens);
    let total = items.len();
    let mut kept = Vec::with_capacity(total);
    for item in items {
        let cost = cost_fn(&item);
        if cost > remaining {
            break;
        }
        remaining -= cost;
        kept.push(item);
    }
    let dropped = total - kept.len();
    provenance.record_truncation(
        field,
        dropped,
        format!("dropped {dropped} lowest-ranked {field} to stay within the token budget"),
    );
    kept
}

/// Collapse a verbose optional field (e.g. long documentation strings) once
/// item-level truncation alone isn't enough, per the pruning order's second
/// step.
pub fn collapse_verbose_field(value: &mut Option<String>, max_chars: usize) -> bool {
    match value {
        Some(text) if text.len() > max_chars => {
            text.truncate(max_chars);
            text.push('\u{2026}');
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RepoStateMode;

    #[test]
    fn truncate_to_budget_keeps_prefix_that_fits() {
        let mut provenance = ProvenanceBuilder::new(
            crate::types::RepoStateId::from_hash(1),
            false,
            RepoStateMode::Head,
        );
        let items = vec![10u32, 10, 10, 10, 10];
        let budget = TokenBudget::new(256);
        let kept = truncate_to_budget(items, budget, 256 - 35, |n| *n, "items", &mut provenance);
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn collapse_verbose_field_truncates_long_text() {
        let mut doc = Some("a".repeat(100));
        let collapsed = collapse_verbose_field(&mut doc, 10);
        assert!(collapsed);
        assert!(doc.unwrap().len() <= 11);
    }
}
