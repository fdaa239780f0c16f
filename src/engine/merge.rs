//! Merge rules for combining `PartialAnswer`s across adapters: union+dedup for references/call edges, highest-confidence-wins
//! for symbols.

use crate::adapters::PartialAnswer;
use crate::types::{CallEdge, Reference, Symbol};
use std::collections::HashMap;

/// One adapter's answer tagged with the confidence it reported, so
/// `merge_symbols` can prefer the backend most sure of itself.
pub struct ScoredAnswer {
    pub backend_id: String,
    pub answer: PartialAnswer,
}

/// Merge symbol facts across backends: one `Symbol` per `stable_id`,
/// keeping the copy from whichever backend reported the highest confidence
/// (the backend most sure of itself wins).
pub fn merge_symbols(answers: &[ScoredAnswer]) -> Vec<Symbol> {
    let mut best: HashMap<String, (f32, Symbol)> = HashMap::new();
    for scored in answers {
        let confidence = scored.answer.confidence.get();
        for symbol in &scored.answer.symbols {
            let key = symbol.stable_id.as_str().to_string();
            match best.get(&key) {
                Some((existing_confidence, _)) if *existing_confidence >= confidence => {}
                _ => {
                    best.insert(key, (confidence, symbol.clone()));
                }
            }
        }
    }
    let mut symbols: Vec<Symbol> = best.into_values().map(|(_, s)| s).collect();
    symbols.sort_by(|a, b| a.stable_id.as_str().cmp(b.stable_id.as_str()));
    symbols
}

/// Union references across backends, deduping by `(from_location,
/// to_stable_id, kind)`.
pub fn merge_references(answers: &[ScoredAnswer]) -> Vec<Reference> {
    let mut seen = std::collections::HashSet::new();
    let mut merged = Vec::new();
    for scored in answers {
        for reference in &scored.answer.references {
            if seen.insert(reference.dedup_key()) {
                merged.push(reference.clone());
            }
        }
    }
    merged
}

/// Union call edges, deduping on the underlying reference's dedup key.
pub fn merge_call_edges(answers: &[ScoredAnswer]) -> Vec<CallEdge> {
    let mut seen = std::collections::HashSet::new();
    let mut merged = Vec::new();
    for scored in answers {
        for edge in &scored.answer.call_edges {
            if seen.insert(edge.reference.dedup_key()) {
                merged.push(edge.clone());
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Confidence, Location, ReferenceKind, StableId};

    fn reference(to: &str, line: u32) -> Reference {
        Reference {
            from_location: Location::point("f1", line, 0),
            to_stable_id: StableId::new(to).unwrap(),
            kind: ReferenceKind::Call,
            is_test: false,
        }
    }

    #[test]
    fn merge_references_dedupes_identical_entries_across_backends() {
        let mut scip_answer = PartialAnswer::default();
        scip_answer.references.push(reference("target", 10));
        let mut lsp_answer = PartialAnswer::default();
        lsp_answer.references.push(reference("target", 10));
        lsp_answer.references.push(reference("other", 20));

        let merged = merge_references(&[
            ScoredAnswer { backend_id: "scip".into(), answer: scip_answer },
            ScoredAnswer { backend_id: "lsp".into(), answer: lsp_answer },
        ]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn merge_symbols_prefers_higher_confidence() {
        use crate::types::{RepoStateId, SymbolKind, Visibility};
        let symbol = |id: &str| Symbol {
            repo_state_id: RepoStateId::from_hash(1),
            stable_id: StableId::new(id).unwrap(),
            name: id.to_string(),
            kind: SymbolKind::Function,
            signature: String::new(),
            signature_normalized: String::new(),
            module_id: "m".into(),
            location: Location::point("f1", 1, 0),
            container_name: None,
            documentation: None,
            modifiers: vec![],
            visibility: Visibility::Public,
            visibility_confidence: Confidence::new(1.0),
        };
        let mut low = PartialAnswer::default();
        low.symbols.push(symbol("alpha"));
        low.confidence = Confidence::new(0.3);
        let mut high = PartialAnswer::default();
        high.symbols.push(symbol("alpha"));
        high.confidence = Confidence::new(0.9);

        let merged = merge_symbols(&[
            ScoredAnswer { backend_id: "tree_sitter".into(), answer: low },
            ScoredAnswer { backend_id: "scip".into(), answer: high },
        ]);
        assert_eq!(merged.len(), 1);
    }
}
