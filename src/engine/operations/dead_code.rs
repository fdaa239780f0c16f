//! `find_dead_code`, `justify_symbol`.

use crate::adapters::{Capability, FactQuery};
use crate::engine::provenance::CompositeResult;
use crate::engine::{Engine, DEFAULT_QUERY_BUDGET};
use crate::error::CkbError;
use crate::repo_state::RepoState;
use crate::types::{RepoStateId, RepoStateMode, StableId, Visibility};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadCodeCategory {
    NoReferences,
    SelfOnly,
    InternalOnly,
    TestOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadCodeCandidate {
    pub stable_id: StableId,
    pub category: DeadCodeCategory,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindDeadCodeFacts {
    pub candidates: Vec<DeadCodeCandidate>,
}

/// Classify `stable_id` by its reference shape; returns `None` if it has
/// any reference that isn't self/test-only (i.e. it's live).
fn classify(
    engine: &Engine,
    repo_state_id: RepoStateId,
    stable_id: &StableId,
    exclude_test_only: bool,
) -> Option<(DeadCodeCategory, f32)> {
    let refs = engine.facts().find_references(repo_state_id, stable_id, true);
    if refs.is_empty() {
        return Some((DeadCodeCategory::NoReferences, 0.95));
    }
    let non_test: Vec<_> = refs.iter().filter(|r| !r.is_test).collect();
    if non_test.is_empty() {
        return if exclude_test_only { None } else { Some((DeadCodeCategory::TestOnly, 0.6)) };
    }
    let symbol = engine.facts().resolve_symbol(repo_state_id, stable_id)?;
    let all_self = non_test.iter().all(|r| r.to_stable_id == symbol.stable_id);
    if all_self {
        return Some((DeadCodeCategory::SelfOnly, 0.8));
    }
    let same_module = non_test.iter().all(|r| {
        engine
            .facts()
            .resolve_symbol(repo_state_id, &r.to_stable_id)
            .map(|s| s.module_id == symbol.module_id)
            .unwrap_or(false)
    });
    if same_module && symbol.visibility != Visibility::Public {
        return Some((DeadCodeCategory::InternalOnly, 0.55));
    }
    None
}

/// `find_dead_code(scope?, include_unexported, min_confidence,
/// exclude_patterns, exclude_test_only, limit)`.
pub async fn find_dead_code(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    include_unexported: bool,
    min_confidence: f32,
    exclude_patterns: &[String],
    exclude_test_only: bool,
    limit: usize,
) -> Result<CompositeResult<FindDeadCodeFacts>, CkbError> {
    let repo_state_id = repo_state.id(mode);
    let args = (include_unexported, min_confidence, exclude_patterns, exclude_test_only, limit);
    engine
        .run_cached("find_dead_code", &args, repo_state_id, || {
            find_dead_code_inner(engine, repo_state, mode, include_unexported, min_confidence, exclude_patterns, exclude_test_only, limit)
        })
        .await
}

async fn find_dead_code_inner(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    include_unexported: bool,
    min_confidence: f32,
    exclude_patterns: &[String],
    exclude_test_only: bool,
    limit: usize,
) -> Result<CompositeResult<FindDeadCodeFacts>, CkbError> {
    let limit = crate::validation::validate_limit("find_dead_code", limit, 5000)?;
    let repo_state_id = repo_state.id(mode);
    let mut provenance = engine.new_provenance_builder(repo_state, mode);

    let answers = engine
        .fan_out(Capability::ResolveSymbol, FactQuery::SearchSymbols { query: String::new(), limit: 100_000 }, DEFAULT_QUERY_BUDGET, &mut provenance)
        .await?;
    engine.facts().merge_symbols(crate::engine::merge::merge_symbols(&answers));

    let all_symbols = engine.facts().store().symbols.all_for_repo_state(repo_state_id);
    let mut candidates = Vec::new();
    for symbol in &all_symbols {
        if !include_unexported && symbol.visibility != Visibility::Public {
            continue;
        }
        if matches_any_exclude_pattern(&symbol.name, exclude_patterns) {
            continue;
        }
        if let Some((category, confidence)) = classify(engine, repo_state_id, &symbol.stable_id, exclude_test_only) {
            if confidence >= min_confidence {
                candidates.push(DeadCodeCandidate { stable_id: symbol.stable_id.clone(), category, confidence });
            }
        }
    }
    sort_candidates(&mut candidates);
    let before = candidates.len();
    candidates.truncate(limit);
    provenance.record_truncation("candidates", before.saturating_sub(candidates.len()), "dropped lowest-confidence dead-code candidates beyond limit");

    let sealed = provenance.seal();
    Ok(CompositeResult::new(FindDeadCodeFacts { candidates }, Vec::new(), sealed))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Keep,
    Investigate,
    Remove,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JustifySymbolFacts {
    pub stable_id: StableId,
    pub verdict: Verdict,
    pub confidence: f32,
    pub reasoning: String,
}

/// `justify_symbol(stable_id)`: derives a keep/investigate/remove verdict
/// from call counts, visibility, and entrypoint proximity.
pub async fn justify_symbol(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    stable_id: &StableId,
) -> Result<CompositeResult<JustifySymbolFacts>, CkbError> {
    let repo_state_id = repo_state.id(mode);
    let args = (stable_id.clone(),);
    engine
        .run_cached("justify_symbol", &args, repo_state_id, || justify_symbol_inner(engine, repo_state, mode, stable_id))
        .await
}

async fn justify_symbol_inner(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    stable_id: &StableId,
) -> Result<CompositeResult<JustifySymbolFacts>, CkbError> {
    let repo_state_id = repo_state.id(mode);
    let mut provenance = engine.new_provenance_builder(repo_state, mode);

    let symbol = engine
        .facts()
        .resolve_symbol(repo_state_id, stable_id)
        .ok_or_else(|| CkbError::NotFound(format!("no symbol {stable_id} at this repo state")))?;

    let entrypoint_answers = engine
        .fan_out(Capability::EntrypointHints, FactQuery::EntrypointHints, DEFAULT_QUERY_BUDGET, &mut provenance)
        .await?;
    let is_near_entrypoint = entrypoint_answers
        .iter()
        .any(|a| a.answer.entrypoints.iter().any(|e| e.stable_id == *stable_id));

    let references = engine.facts().find_references(repo_state_id, stable_id, true);
    let non_test_refs = references.iter().filter(|r| !r.is_test).count();

    let (verdict, confidence, reasoning) = if is_near_entrypoint {
        (Verdict::Keep, 0.9, "reachable from a detected entrypoint".to_string())
    } else if non_test_refs == 0 && symbol.visibility != crate::types::Visibility::Public {
        (
            Verdict::Remove,
            0.85,
            format!("no non-test references and visibility={:?}", symbol.visibility),
        )
    } else if non_test_refs == 0 {
        (Verdict::Investigate, 0.6, "no references found but symbol is public; may be a library entrypoint".to_string())
    } else {
        (Verdict::Keep, 0.7, format!("{non_test_refs} non-test references found"))
    };

    let sealed = provenance.seal();
    Ok(CompositeResult::new(
        JustifySymbolFacts { stable_id: stable_id.clone(), verdict, confidence, reasoning },
        Vec::new(),
        sealed,
    ))
}

fn matches_any_exclude_pattern(name: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| name.contains(pattern.as_str()))
}

fn sort_candidates(candidates: &mut [DeadCodeCandidate]) {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.stable_id.as_str().cmp(b.stable_id.as_str()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, category: DeadCodeCategory, confidence: f32) -> DeadCodeCandidate {
        DeadCodeCandidate { stable_id: StableId::new(id).unwrap(), category, confidence }
    }

    #[test]
    fn exclude_pattern_matches_substring_of_name() {
        let patterns = vec!["_test".to_string(), "Generated".to_string()];
        assert!(matches_any_exclude_pattern("helper_test", &patterns));
        assert!(matches_any_exclude_pattern("GeneratedStub", &patterns));
        assert!(!matches_any_exclude_pattern("real_helper", &patterns));
    }

    #[test]
    fn no_patterns_excludes_nothing() {
        assert!(!matches_any_exclude_pattern("anything", &[]));
    }

    #[test]
    fn candidates_sort_by_confidence_descending_then_stable_id() {
        let mut candidates = vec![
            candidate("b::low", DeadCodeCategory::InternalOnly, 0.55),
            candidate("a::high", DeadCodeCategory::NoReferences, 0.95),
            candidate("c::tie", DeadCodeCategory::SelfOnly, 0.55),
        ];
        sort_candidates(&mut candidates);
        let ids: Vec<&str> = candidates.iter().map(|c| c.stable_id.as_str()).collect();
        assert_eq!(ids, vec!["a::high", "b::low", "c::tie"]);
    }
}
