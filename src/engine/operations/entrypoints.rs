//! `list_entrypoints`.

use crate::adapters::{Capability, FactQuery};
use crate::engine::provenance::CompositeResult;
use crate::engine::{ranking, Engine, DEFAULT_QUERY_BUDGET};
use crate::error::CkbError;
use crate::repo_state::RepoState;
use crate::types::{RepoStateMode, StableId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrypointFacts {
    pub stable_id: StableId,
    pub basis: String,
    pub fan_out: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEntrypointsFacts {
    pub entrypoints: Vec<EntrypointFacts>,
}

/// `list_entrypoints(module_filter?, limit)`: symbols detected as entrypoints
/// via language-specific naming heuristics, ranked by fan-out (how many
/// other symbols they transitively reach).
pub async fn list_entrypoints(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    module_filter: Option<&str>,
    limit: usize,
) -> Result<CompositeResult<ListEntrypointsFacts>, CkbError> {
    let repo_state_id = repo_state.id(mode);
    let args = (module_filter, limit);
    engine
        .run_cached("list_entrypoints", &args, repo_state_id, || {
            list_entrypoints_inner(engine, repo_state, mode, module_filter, limit)
        })
        .await
}

async fn list_entrypoints_inner(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    module_filter: Option<&str>,
    limit: usize,
) -> Result<CompositeResult<ListEntrypointsFacts>, CkbError> {
    let limit = crate::validation::validate_limit("list_entrypoints", limit, 1000)?;
    let repo_state_id = repo_state.id(mode);
    let mut provenance = engine.new_provenance_builder(repo_state, mode);

    let answers = engine
        .fan_out(Capability::EntrypointHints, FactQuery::EntrypointHints, DEFAULT_QUERY_BUDGET, &mut provenance)
        .await?;

    let mut entrypoints: Vec<EntrypointFacts> = answers
        .iter()
        .flat_map(|a| {
            a.answer.entrypoints.iter().map(|e| EntrypointFacts {
                stable_id: e.stable_id.clone(),
                basis: e.basis.clone(),
                fan_out: e.fan_out,
            })
        })
        .collect();

    if let Some(module_filter) = module_filter {
        entrypoints.retain(|e| {
            engine
                .facts()
                .resolve_symbol(repo_state_id, &e.stable_id)
                .map(|s| s.module_id == module_filter)
                .unwrap_or(false)
        });
    }

    ranking::sort_by_rank_then_id(&mut entrypoints, |e| e.fan_out as f32, |e| &e.stable_id);
    let before = entrypoints.len();
    entrypoints.truncate(limit);
    provenance.record_truncation("entrypoints", before.saturating_sub(entrypoints.len()), "dropped lowest fan-out entrypoints beyond limit");

    let sealed = provenance.seal();
    Ok(CompositeResult::new(ListEntrypointsFacts { entrypoints }, Vec::new(), sealed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, fan_out: usize) -> EntrypointFacts {
        EntrypointFacts { stable_id: StableId::new(id).unwrap(), basis: "naming".to_string(), fan_out }
    }

    #[test]
    fn entrypoints_rank_highest_fan_out_first() {
        let mut entries = vec![entry("a::low", 1), entry("a::high", 50), entry("a::mid", 10)];
        ranking::sort_by_rank_then_id(&mut entries, |e| e.fan_out as f32, |e| &e.stable_id);
        let ranked: Vec<&str> = entries.iter().map(|e| e.stable_id.as_str()).collect();
        assert_eq!(ranked, vec!["a::high", "a::mid", "a::low"]);
    }

    #[test]
    fn ties_break_by_stable_id() {
        let mut entries = vec![entry("b::f", 5), entry("a::f", 5)];
        ranking::sort_by_rank_then_id(&mut entries, |e| e.fan_out as f32, |e| &e.stable_id);
        let ranked: Vec<&str> = entries.iter().map(|e| e.stable_id.as_str()).collect();
        assert_eq!(ranked, vec!["a::f", "b::f"]);
    }
}
