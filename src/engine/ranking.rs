//! Scoring/ordering helpers shared across operations: deterministic
//! `(rank desc, stable_id asc)` output ordering and a
//! couple of operation-specific scorers.

use crate::types::{CallEdge, StableId, Symbol};
use std::cmp::Ordering;

/// Sort `items` by `(rank desc, stable_id asc)`, the deterministic ordering
/// requires of every composite result.
pub fn sort_by_rank_then_id<T>(items: &mut [T], rank: impl Fn(&T) -> f32, stable_id: impl Fn(&T) -> &StableId) {
    items.sort_by(|a, b| {
        rank(b)
            .partial_cmp(&rank(a))
            .unwrap_or(Ordering::Equal)
            .then_with(|| stable_id(a).as_str().cmp(stable_id(b).as_str()))
    });
}

/// Symbol search rank: kind priority, then visibility weight, then exact
/// substring match position (earlier match ranks higher).
pub fn symbol_search_rank(symbol: &Symbol, query: &str) -> f32 {
    let name = symbol.name.to_lowercase();
    let needle = query.to_lowercase();
    let position_bonus = match name.find(&needle) {
        Some(0) => 2.0,
        Some(_) => 1.0,
        None => 0.0,
    };
    symbol.kind.priority() as f32 * 10.0 + symbol.visibility.weight() as f32 + position_bonus
}

/// Impact rank: edges closer to the changed symbol (fewer hops) and `Call`
/// edges rank above weaker reference kinds.
pub fn call_edge_rank(edge: &CallEdge, hop: u32) -> f32 {
    let kind_weight = match edge.reference.kind {
        crate::types::ReferenceKind::Call => 3.0,
        crate::types::ReferenceKind::Inherit | crate::types::ReferenceKind::Implement => 2.0,
        _ => 1.0,
    };
    kind_weight - hop as f32 * 0.1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Confidence, Location, RepoStateId, SymbolKind, Visibility};

    fn symbol(id: &str, kind: SymbolKind) -> Symbol {
        Symbol {
            repo_state_id: RepoStateId::from_hash(1),
            stable_id: StableId::new(id).unwrap(),
            name: id.to_string(),
            kind,
            signature: String::new(),
            signature_normalized: String::new(),
            module_id: "m".into(),
            location: Location::point("f1", 1, 0),
            container_name: None,
            documentation: None,
            modifiers: vec![],
            visibility: Visibility::Public,
            visibility_confidence: Confidence::new(1.0),
        }
    }

    #[test]
    fn sort_by_rank_then_id_breaks_ties_on_stable_id() {
        let mut items = vec![symbol("zulu", SymbolKind::Function), symbol("alpha", SymbolKind::Function)];
        sort_by_rank_then_id(&mut items, |_| 1.0, |s| &s.stable_id);
        assert_eq!(items[0].name, "alpha");
    }

    #[test]
    fn type_ranks_above_variable_for_equal_query_match() {
        let type_symbol = symbol("foo", SymbolKind::Type);
        let var_symbol = symbol("foo", SymbolKind::Variable);
        assert!(symbol_search_rank(&type_symbol, "foo") > symbol_search_rank(&var_symbol, "foo"));
    }
}
