//! `get_symbol`, `search_symbols`, `find_references`.

use crate::adapters::{Capability, FactQuery};
use crate::engine::provenance::{CompositeResult, Drilldown};
use crate::engine::{budget, merge, ranking, Engine, DEFAULT_QUERY_BUDGET};
use crate::error::CkbError;
use crate::repo_state::RepoState;
use crate::types::{ModuleRecord, Reference, RepoStateMode, StableId, Symbol, TokenBudget};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolFacts {
    pub symbol: Symbol,
    pub module: Option<ModuleRecord>,
}

/// `get_symbol(stable_id, repo_state_mode)`: fails `NotFound` if the id
/// doesn't resolve at this repo state. Storage is the authority here; no
/// adapter fan-out is needed once a symbol has been merged in.
pub async fn get_symbol(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    stable_id: &StableId,
) -> Result<CompositeResult<SymbolFacts>, CkbError> {
    let repo_state_id = repo_state.id(mode);
    let args = (stable_id.clone(),);
    engine
        .run_cached("get_symbol", &args, repo_state_id, || get_symbol_inner(engine, repo_state, mode, stable_id))
        .await
}

async fn get_symbol_inner(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    stable_id: &StableId,
) -> Result<CompositeResult<SymbolFacts>, CkbError> {
    let repo_state_id = repo_state.id(mode);
    let mut provenance = engine.new_provenance_builder(repo_state, mode);

    let symbol = engine
        .facts()
        .resolve_symbol(repo_state_id, stable_id)
        .ok_or_else(|| CkbError::NotFound(format!("no symbol {stable_id} at this repo state")))?;
    let module = engine.facts().module_for_file(repo_state_id, &symbol.location.file_id);

    provenance.record_success("storage", vec![], 0, false);
    let sealed = provenance.seal();
    let drilldowns = vec![
        Drilldown {
            label: "find references".into(),
            query: format!("find_references(stable_id=\"{stable_id}\")"),
        },
        Drilldown {
            label: "call graph".into(),
            query: format!("get_call_graph(stable_id=\"{stable_id}\", direction=both, depth=1)"),
        },
    ];
    Ok(CompositeResult::new(SymbolFacts { symbol, module }, drilldowns, sealed))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSymbolsFacts {
    pub symbols: Vec<Symbol>,
}

/// `search_symbols(query, scope?, kinds?, limit)`. Fans out to every adapter
/// declaring `ResolveSymbol`-adjacent search support, merges with whatever
/// is already in Storage, ranks and truncates.
pub async fn search_symbols(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    query: &str,
    limit: usize,
) -> Result<CompositeResult<SearchSymbolsFacts>, CkbError> {
    let repo_state_id = repo_state.id(mode);
    let args = (query, limit);
    engine
        .run_cached("search_symbols", &args, repo_state_id, || {
            search_symbols_inner(engine, repo_state, mode, query, limit)
        })
        .await
}

async fn search_symbols_inner(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    query: &str,
    limit: usize,
) -> Result<CompositeResult<SearchSymbolsFacts>, CkbError> {
    crate::validation::validate_query("search_symbols", query)?;
    let limit = crate::validation::validate_limit("search_symbols", limit, 500)?;
    let repo_state_id = repo_state.id(mode);
    let mut provenance = engine.new_provenance_builder(repo_state, mode);

    let fact_query = FactQuery::SearchSymbols { query: query.to_string(), limit: limit * 2 };
    let answers = engine
        .fan_out(Capability::ResolveSymbol, fact_query, DEFAULT_QUERY_BUDGET, &mut provenance)
        .await?;

    let mut merged = merge::merge_symbols(&answers);
    engine.facts().merge_symbols(merged.clone());

    let stored = engine.facts().search_symbols(repo_state_id, query, limit * 2);
    for symbol in stored {
        if !merged.iter().any(|s| s.stable_id == symbol.stable_id) {
            merged.push(symbol);
        }
    }

    ranking::sort_by_rank_then_id(&mut merged, |s| ranking::symbol_search_rank(s, query), |s| &s.stable_id);
    let before = merged.len();
    merged.truncate(limit);
    provenance.record_truncation("symbols", before.saturating_sub(merged.len()), "dropped lowest-ranked matches beyond limit");

    let sealed = provenance.seal();
    let drilldowns = merged
        .first()
        .map(|s| {
            vec![Drilldown {
                label: format!("get_symbol({})", s.name),
                query: format!("get_symbol(stable_id=\"{}\")", s.stable_id),
            }]
        })
        .unwrap_or_default();
    Ok(CompositeResult::new(SearchSymbolsFacts { symbols: merged }, drilldowns, sealed))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindReferencesFacts {
    pub references: Vec<Reference>,
    pub grouped_by_file: HashMap<String, usize>,
}

/// `find_references(stable_id, scope?, include_tests, limit)`.
pub async fn find_references(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    stable_id: &StableId,
    include_tests: bool,
    limit: usize,
) -> Result<CompositeResult<FindReferencesFacts>, CkbError> {
    let repo_state_id = repo_state.id(mode);
    let args = (stable_id.clone(), include_tests, limit);
    engine
        .run_cached("find_references", &args, repo_state_id, || {
            find_references_inner(engine, repo_state, mode, stable_id, include_tests, limit)
        })
        .await
}

async fn find_references_inner(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    stable_id: &StableId,
    include_tests: bool,
    limit: usize,
) -> Result<CompositeResult<FindReferencesFacts>, CkbError> {
    crate::validation::validate_stable_id("find_references", stable_id.as_str())?;
    let limit = crate::validation::validate_limit("find_references", limit, 10_000)?;
    let repo_state_id = repo_state.id(mode);
    let mut provenance = engine.new_provenance_builder(repo_state, mode);

    let fact_query = FactQuery::FindReferences { stable_id: stable_id.clone(), include_tests };
    let answers = engine
        .fan_out(Capability::FindRefs, fact_query, DEFAULT_QUERY_BUDGET, &mut provenance)
        .await?;

    let fresh = merge::merge_references(&answers);
    engine.facts().merge_references(repo_state_id, fresh);

    let mut references = engine.facts().find_references(repo_state_id, stable_id, include_tests);
    references.sort_by(|a, b| {
        a.from_location
            .file_id
            .cmp(&b.from_location.file_id)
            .then(a.from_location.start_line.cmp(&b.from_location.start_line))
    });

    let before = references.len();
    references.truncate(limit);
    provenance.record_truncation("references", before.saturating_sub(references.len()), "exceeded requested limit");
    let budget = TokenBudget::new(engine.config().budgets.max_tokens);
    let references = budget::truncate_to_budget(references, budget, 0, |_| 8, "references", &mut provenance);

    let grouped_by_file = group_references_by_file(&references);

    let sealed = provenance.seal();
    let drilldowns = vec![Drilldown {
        label: "callers".into(),
        query: format!("get_call_graph(stable_id=\"{stable_id}\", direction=callers, depth=1)"),
    }];
    Ok(CompositeResult::new(FindReferencesFacts { references, grouped_by_file }, drilldowns, sealed))
}

fn group_references_by_file(references: &[Reference]) -> HashMap<String, usize> {
    let mut grouped = HashMap::new();
    for reference in references {
        *grouped.entry(reference.from_location.file_id.clone()).or_insert(0usize) += 1;
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Location, ReferenceKind};

    fn reference(file: &str) -> Reference {
        Reference {
            from_location: Location::point(file, 1, 0),
            to_stable_id: StableId::new("a::f").unwrap(),
            kind: ReferenceKind::Call,
            is_test: false,
        }
    }

    #[test]
    fn group_references_by_file_counts_per_file() {
        let refs = vec![reference("a.rs"), reference("a.rs"), reference("b.rs")];
        let grouped = group_references_by_file(&refs);
        assert_eq!(grouped.get("a.rs"), Some(&2));
        assert_eq!(grouped.get("b.rs"), Some(&1));
    }

    #[test]
    fn group_references_by_file_is_empty_for_no_references() {
        assert!(group_references_by_file(&[]).is_empty());
    }
}

