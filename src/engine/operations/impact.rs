//! `analyze_impact`, `analyze_change_set`, `summarize_pr`.

use crate::adapters::{Capability, Direction, FactQuery};
use crate::engine::provenance::{CompositeResult, Drilldown};
use crate::engine::{Engine, DEFAULT_QUERY_BUDGET};
use crate::error::CkbError;
use crate::repo_state::RepoState;
use crate::types::{Depth, RepoStateMode, StableId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskScore {
    pub level: RiskLevel,
    pub score: f32,
    pub factors: Vec<String>,
}

fn score_risk(affected_symbols: usize, affected_modules: usize, touches_entrypoint: bool) -> RiskScore {
    let mut score = (affected_symbols as f32 * 0.05 + affected_modules as f32 * 0.15).min(1.0);
    let mut factors = vec![format!("{affected_symbols} downstream symbols"), format!("{affected_modules} modules touched")];
    if touches_entrypoint {
        score = (score + 0.25).min(1.0);
        factors.push("reaches a detected entrypoint".to_string());
    }
    let level = match score {
        s if s >= 0.75 => RiskLevel::Critical,
        s if s >= 0.5 => RiskLevel::High,
        s if s >= 0.2 => RiskLevel::Medium,
        _ => RiskLevel::Low,
    };
    RiskScore { level, score, factors }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactedSymbol {
    pub stable_id: StableId,
    pub distance: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleImpact {
    pub module_id: String,
    pub direct: usize,
    pub transitive: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeImpactFacts {
    pub direct_impact: Vec<ImpactedSymbol>,
    pub transitive_impact: Vec<ImpactedSymbol>,
    pub modules_affected: Vec<ModuleImpact>,
    pub risk_score: RiskScore,
}

/// BFS over callers of `stable_id` up to `depth` hops, bucketed by distance.
/// Used directly by `analyze_impact` and as the core of `analyze_change_set`
/// applied per changed symbol.
async fn impact_bfs(
    engine: &Engine,
    repo_state_id: crate::types::RepoStateId,
    stable_id: &StableId,
    depth: u8,
    include_tests: bool,
) -> Vec<ImpactedSymbol> {
    let mut visited: HashSet<StableId> = HashSet::new();
    visited.insert(stable_id.clone());
    let mut frontier: VecDeque<StableId> = VecDeque::new();
    frontier.push_back(stable_id.clone());
    let mut impacted = Vec::new();

    for distance in 1..=depth {
        let mut next = VecDeque::new();
        while let Some(current) = frontier.pop_front() {
            let edges = engine.facts().call_graph_neighbors(repo_state_id, &current, Direction::Callers, 1);
            for edge in edges {
                if !include_tests && edge.reference.is_test {
                    continue;
                }
                let Some(caller) = engine.facts().symbol_containing(
                    repo_state_id,
                    &edge.reference.from_location.file_id,
                    edge.reference.from_location.start_line,
                ) else {
                    continue;
                };
                if visited.insert(caller.clone()) {
                    impacted.push(ImpactedSymbol { stable_id: caller.clone(), distance: distance as u32 });
                    next.push_back(caller);
                }
            }
        }
        frontier = next;
    }
    impacted
}

fn modules_for(engine: &Engine, repo_state_id: crate::types::RepoStateId, impacted: &[ImpactedSymbol]) -> Vec<ModuleImpact> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for item in impacted {
        let Some(symbol) = engine.facts().resolve_symbol(repo_state_id, &item.stable_id) else { continue };
        let entry = counts.entry(symbol.module_id).or_insert((0, 0));
        if item.distance == 1 {
            entry.0 += 1;
        } else {
            entry.1 += 1;
        }
    }
    let mut modules: Vec<ModuleImpact> = counts
        .into_iter()
        .map(|(module_id, (direct, transitive))| ModuleImpact { module_id, direct, transitive })
        .collect();
    modules.sort_by(|a, b| a.module_id.cmp(&b.module_id));
    modules
}

/// `analyze_impact(stable_id, depth, include_tests)`.
pub async fn analyze_impact(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    stable_id: &StableId,
    depth: u8,
    include_tests: bool,
) -> Result<CompositeResult<AnalyzeImpactFacts>, CkbError> {
    let repo_state_id = repo_state.id(mode);
    let args = (stable_id.clone(), depth, include_tests);
    engine
        .run_cached("analyze_impact", &args, repo_state_id, || {
            analyze_impact_inner(engine, repo_state, mode, stable_id, depth, include_tests)
        })
        .await
}

async fn analyze_impact_inner(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    stable_id: &StableId,
    depth: u8,
    include_tests: bool,
) -> Result<CompositeResult<AnalyzeImpactFacts>, CkbError> {
    let depth = Depth::new(depth.max(1), 4)?.get();
    let repo_state_id = repo_state.id(mode);
    let mut provenance = engine.new_provenance_builder(repo_state, mode);

    let call_edge_answers = engine
        .fan_out(
            Capability::CallEdges,
            FactQuery::CallEdges { stable_id: stable_id.clone(), direction: Direction::Callers, depth },
            DEFAULT_QUERY_BUDGET,
            &mut provenance,
        )
        .await?;
    let fresh_edges = crate::engine::merge::merge_call_edges(&call_edge_answers);
    engine
        .facts()
        .merge_references(repo_state_id, fresh_edges.into_iter().map(|e| e.reference).collect());

    let impacted = impact_bfs(engine, repo_state_id, stable_id, depth, include_tests).await;
    let direct_impact: Vec<ImpactedSymbol> = impacted.iter().filter(|i| i.distance == 1).cloned().collect();
    let transitive_impact: Vec<ImpactedSymbol> = impacted.iter().filter(|i| i.distance > 1).cloned().collect();
    let modules_affected = modules_for(engine, repo_state_id, &impacted);

    let entrypoint_answers = engine
        .fan_out(Capability::EntrypointHints, FactQuery::EntrypointHints, DEFAULT_QUERY_BUDGET, &mut provenance)
        .await?;
    let entrypoint_ids: HashSet<StableId> = entrypoint_answers
        .iter()
        .flat_map(|a| a.answer.entrypoints.iter().map(|e| e.stable_id.clone()))
        .collect();
    let touches_entrypoint = impacted.iter().any(|i| entrypoint_ids.contains(&i.stable_id));

    let risk_score = score_risk(impacted.len(), modules_affected.len(), touches_entrypoint);
    let sealed = provenance.seal();
    let drilldowns = vec![Drilldown {
        label: "call graph callers".into(),
        query: format!("get_call_graph(stable_id=\"{stable_id}\", direction=callers, depth={depth})"),
    }];
    Ok(CompositeResult::new(
        AnalyzeImpactFacts { direct_impact, transitive_impact, modules_affected, risk_score },
        drilldowns,
        sealed,
    ))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlastRadius {
    pub file_count: usize,
    pub module_count: usize,
    pub symbol_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeChangeSetFacts {
    pub changed_symbols: Vec<StableId>,
    pub affected_symbols: Vec<ImpactedSymbol>,
    pub blast_radius: BlastRadius,
    pub risk_score: RiskScore,
    pub recommendations: Vec<String>,
}

/// `analyze_change_set(staged|base_branch, depth, include_tests, strict)`:
/// maps diff hunks to the symbols whose body contains a changed line, then
/// runs the same impact BFS from each. `strict=true` fails `IndexStale` if
/// the SCIP sidecar is behind HEAD.
pub async fn analyze_change_set(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    base: &str,
    head: &str,
    depth: u8,
    include_tests: bool,
    strict: bool,
) -> Result<CompositeResult<AnalyzeChangeSetFacts>, CkbError> {
    let repo_state_id = repo_state.id(mode);
    let args = (base, head, depth, include_tests, strict);
    engine
        .run_cached("analyze_change_set", &args, repo_state_id, || {
            analyze_change_set_inner(engine, repo_state, mode, base, head, depth, include_tests, strict)
        })
        .await
}

async fn analyze_change_set_inner(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    base: &str,
    head: &str,
    depth: u8,
    include_tests: bool,
    strict: bool,
) -> Result<CompositeResult<AnalyzeChangeSetFacts>, CkbError> {
    let depth = Depth::new(depth.max(1), 4)?.get();
    let repo_state_id = repo_state.id(mode);
    let mut provenance = engine.new_provenance_builder(repo_state, mode);

    let diff_answers = engine
        .fan_out(
            Capability::Diff,
            FactQuery::Diff { base: base.to_string(), head: head.to_string() },
            DEFAULT_QUERY_BUDGET,
            &mut provenance,
        )
        .await?;

    if strict {
        if let Some(freshness) = provenance.index_freshness() {
            if freshness.stale_against_head {
                return Err(CkbError::IndexStale(format!(
                    "index last built at {} but HEAD is {}",
                    freshness.last_indexed_commit, freshness.head_commit
                )));
            }
        }
    }

    let mut changed_symbols = Vec::new();
    for scored in &diff_answers {
        for hunk in &scored.answer.diff_hunks {
            let touched_lines: Vec<u32> = hunk.added_lines.iter().chain(hunk.removed_lines.iter()).copied().collect();
            for line in touched_lines {
                if let Some(stable_id) = engine.facts().symbol_containing(repo_state_id, &hunk.file_id, line) {
                    if !changed_symbols.contains(&stable_id) {
                        changed_symbols.push(stable_id);
                    }
                }
            }
        }
    }

    let mut affected_symbols: Vec<ImpactedSymbol> = Vec::new();
    let mut file_ids: HashSet<String> = diff_answers
        .iter()
        .flat_map(|a| a.answer.diff_hunks.iter().map(|h| h.file_id.clone()))
        .collect();
    for stable_id in &changed_symbols {
        for impacted in impact_bfs(engine, repo_state_id, stable_id, depth, include_tests).await {
            if let Some(symbol) = engine.facts().resolve_symbol(repo_state_id, &impacted.stable_id) {
                file_ids.insert(symbol.location.file_id);
            }
            if !affected_symbols.iter().any(|i| i.stable_id == impacted.stable_id) {
                affected_symbols.push(impacted);
            }
        }
    }

    let modules_affected = modules_for(engine, repo_state_id, &affected_symbols);
    let blast_radius = BlastRadius {
        file_count: file_ids.len(),
        module_count: modules_affected.len(),
        symbol_count: changed_symbols.len() + affected_symbols.len(),
    };
    let risk_score = score_risk(affected_symbols.len(), modules_affected.len(), false);

    let mut recommendations = Vec::new();
    if matches!(risk_score.level, RiskLevel::High | RiskLevel::Critical) {
        recommendations.push("request review from owners of all affected modules".to_string());
    }
    if blast_radius.file_count > 10 {
        recommendations.push("consider splitting this change into smaller commits".to_string());
    }

    let sealed = provenance.seal();
    Ok(CompositeResult::new(
        AnalyzeChangeSetFacts { changed_symbols, affected_symbols, blast_radius, risk_score, recommendations },
        Vec::new(),
        sealed,
    ))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChangeStat {
    pub file_id: String,
    pub path: String,
    pub added_lines: usize,
    pub removed_lines: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizePrFacts {
    pub file_stats: Vec<FileChangeStat>,
    pub modules_affected: Vec<ModuleImpact>,
    pub risk_score: RiskScore,
    pub suggested_reviewers: Vec<String>,
}

/// `summarize_pr(base, head, include_ownership)`.
pub async fn summarize_pr(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    base: &str,
    head: &str,
    include_ownership: bool,
) -> Result<CompositeResult<SummarizePrFacts>, CkbError> {
    let repo_state_id = repo_state.id(mode);
    let args = (base, head, include_ownership);
    engine
        .run_cached("summarize_pr", &args, repo_state_id, || {
            summarize_pr_inner(engine, repo_state, mode, base, head, include_ownership)
        })
        .await
}

async fn summarize_pr_inner(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    base: &str,
    head: &str,
    include_ownership: bool,
) -> Result<CompositeResult<SummarizePrFacts>, CkbError> {
    let repo_state_id = repo_state.id(mode);
    let mut provenance = engine.new_provenance_builder(repo_state, mode);

    let diff_answers = engine
        .fan_out(
            Capability::Diff,
            FactQuery::Diff { base: base.to_string(), head: head.to_string() },
            DEFAULT_QUERY_BUDGET,
            &mut provenance,
        )
        .await?;

    let mut file_stats = Vec::new();
    let mut changed_symbols = Vec::new();
    for scored in &diff_answers {
        for hunk in &scored.answer.diff_hunks {
            file_stats.push(FileChangeStat {
                file_id: hunk.file_id.clone(),
                path: hunk.path.clone(),
                added_lines: hunk.added_lines.len(),
                removed_lines: hunk.removed_lines.len(),
            });
            for line in hunk.added_lines.iter().chain(hunk.removed_lines.iter()) {
                if let Some(stable_id) = engine.facts().symbol_containing(repo_state_id, &hunk.file_id, *line) {
                    if !changed_symbols.contains(&stable_id) {
                        changed_symbols.push(stable_id);
                    }
                }
            }
        }
    }

    let mut affected: Vec<ImpactedSymbol> = Vec::new();
    for stable_id in &changed_symbols {
        for impacted in impact_bfs(engine, repo_state_id, stable_id, 2, true).await {
            if !affected.iter().any(|i| i.stable_id == impacted.stable_id) {
                affected.push(impacted);
            }
        }
    }
    let modules_affected = modules_for(engine, repo_state_id, &affected);
    let risk_score = score_risk(affected.len(), modules_affected.len(), false);

    let mut suggested_reviewers = Vec::new();
    if include_ownership {
        for stat in &file_stats {
            let commits = engine.facts().commits_for_path(repo_state_id, &stat.file_id);
            if let Some(top_author) = top_author_by_touches(&commits) {
                if !suggested_reviewers.contains(&top_author) {
                    suggested_reviewers.push(top_author);
                }
            }
        }
    }

    let sealed = provenance.seal();
    Ok(CompositeResult::new(
        SummarizePrFacts { file_stats, modules_affected, risk_score, suggested_reviewers },
        Vec::new(),
        sealed,
    ))
}

fn top_author_by_touches(commits: &[crate::types::CommitTouch]) -> Option<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for commit in commits {
        *counts.entry(commit.author.clone()).or_insert(0) += 1;
    }
    counts.into_iter().max_by_key(|(_, count)| *count).map(|(author, _)| author)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CommitTouch;

    fn touch(author: &str) -> CommitTouch {
        CommitTouch {
            commit_id: "abc".to_string(),
            author: author.to_string(),
            time: chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().into(),
            file_id: "f".to_string(),
            additions: 1,
            deletions: 0,
        }
    }

    #[test]
    fn low_impact_with_no_entrypoint_reach_scores_low() {
        let risk = score_risk(1, 1, false);
        assert_eq!(risk.level, RiskLevel::Low);
    }

    #[test]
    fn wide_blast_radius_escalates_to_high_or_critical() {
        let risk = score_risk(20, 10, false);
        assert!(matches!(risk.level, RiskLevel::High | RiskLevel::Critical));
    }

    #[test]
    fn touching_an_entrypoint_adds_a_fixed_penalty_and_a_factor() {
        let without = score_risk(2, 1, false);
        let with = score_risk(2, 1, true);
        assert!(with.score > without.score);
        assert!(with.factors.iter().any(|f| f.contains("entrypoint")));
    }

    #[test]
    fn score_never_exceeds_one() {
        let risk = score_risk(10_000, 10_000, true);
        assert!(risk.score <= 1.0);
    }

    #[test]
    fn top_author_by_touches_picks_the_most_frequent_author() {
        let commits = vec![touch("alice"), touch("bob"), touch("alice")];
        assert_eq!(top_author_by_touches(&commits), Some("alice".to_string()));
    }

    #[test]
    fn top_author_by_touches_is_none_for_empty_history() {
        assert_eq!(top_author_by_touches(&[]), None);
    }
}
