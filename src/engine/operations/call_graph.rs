//! `get_call_graph`, `trace_usage`.

use crate::adapters::{Capability, Direction, FactQuery};
use crate::engine::provenance::{CompositeResult, Drilldown};
use crate::engine::{merge, ranking, Engine, DEFAULT_QUERY_BUDGET};
use crate::error::CkbError;
use crate::repo_state::RepoState;
use crate::types::{CallEdge, Depth, RepoStateMode, StableId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallGraphNode {
    pub stable_id: StableId,
    pub role: &'static str,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallGraphFacts {
    pub nodes: Vec<CallGraphNode>,
    pub edges: Vec<CallEdge>,
}

/// `get_call_graph(stable_id, direction, depth)`: depth is clamped to the
/// spec's 1..4 bound. A PageRank-like score over the local neighborhood is
/// approximated by in-degree within the returned edge set, which is the only
/// graph available once the fan-out is bounded to this neighborhood.
pub async fn get_call_graph(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    stable_id: &StableId,
    direction: Direction,
    depth: u8,
) -> Result<CompositeResult<CallGraphFacts>, CkbError> {
    let repo_state_id = repo_state.id(mode);
    let args = (stable_id.clone(), direction, depth);
    engine
        .run_cached("get_call_graph", &args, repo_state_id, || {
            get_call_graph_inner(engine, repo_state, mode, stable_id, direction, depth)
        })
        .await
}

async fn get_call_graph_inner(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    stable_id: &StableId,
    direction: Direction,
    depth: u8,
) -> Result<CompositeResult<CallGraphFacts>, CkbError> {
    let depth = Depth::new(depth.max(1), 4)?;
    let repo_state_id = repo_state.id(mode);
    let mut provenance = engine.new_provenance_builder(repo_state, mode);

    let fact_query = FactQuery::CallEdges { stable_id: stable_id.clone(), direction, depth: depth.get() };
    let answers = engine
        .fan_out(Capability::CallEdges, fact_query, DEFAULT_QUERY_BUDGET, &mut provenance)
        .await?;
    let mut edges = merge::merge_call_edges(&answers);

    let local = engine.facts().call_graph_neighbors(repo_state_id, stable_id, direction, depth.get());
    for edge in local {
        if !edges.iter().any(|e| e.reference.dedup_key() == edge.reference.dedup_key()) {
            edges.push(edge);
        }
    }

    let (nodes, edges) = score_neighborhood(stable_id, edges);
    let sealed = provenance.seal();
    let drilldowns = vec![Drilldown {
        label: "trace usage from entrypoints".into(),
        query: format!("trace_usage(stable_id=\"{stable_id}\")"),
    }];
    Ok(CompositeResult::new(CallGraphFacts { nodes, edges }, drilldowns, sealed))
}

fn score_neighborhood(stable_id: &StableId, edges: Vec<CallEdge>) -> (Vec<CallGraphNode>, Vec<CallEdge>) {
    let mut in_degree: HashMap<StableId, u32> = HashMap::new();
    for edge in &edges {
        *in_degree.entry(edge.reference.to_stable_id.clone()).or_insert(0) += 1;
    }
    let mut node_ids: Vec<StableId> = vec![stable_id.clone()];
    for edge in &edges {
        if !node_ids.contains(&edge.reference.to_stable_id) {
            node_ids.push(edge.reference.to_stable_id.clone());
        }
    }
    let mut nodes: Vec<CallGraphNode> = node_ids
        .into_iter()
        .map(|id| {
            let score = *in_degree.get(&id).unwrap_or(&0) as f32;
            let role = if id == *stable_id { "target" } else { "neighbor" };
            CallGraphNode { stable_id: id, role, score }
        })
        .collect();
    ranking::sort_by_rank_then_id(&mut nodes, |n| n.score, |n| &n.stable_id);
    (nodes, edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Location, ReferenceKind, Reference};

    fn edge(from: &str, to: &str) -> CallEdge {
        CallEdge {
            reference: Reference {
                from_location: Location::point(from, 1, 0),
                to_stable_id: StableId::new(to).unwrap(),
                kind: ReferenceKind::Call,
                is_test: false,
            },
            call_site_expr: None,
        }
    }

    #[test]
    fn target_node_is_always_present_even_with_no_edges() {
        let target = StableId::new("a::f").unwrap();
        let (nodes, edges) = score_neighborhood(&target, Vec::new());
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].stable_id, target);
        assert_eq!(nodes[0].role, "target");
        assert!(edges.is_empty());
    }

    #[test]
    fn neighbor_score_is_in_degree_within_returned_edges() {
        let target = StableId::new("a::f").unwrap();
        let edges = vec![edge("x.rs", "a::g"), edge("y.rs", "a::g"), edge("z.rs", "a::h")];
        let (nodes, _) = score_neighborhood(&target, edges);
        let g = nodes.iter().find(|n| n.stable_id.as_str() == "a::g").unwrap();
        let h = nodes.iter().find(|n| n.stable_id.as_str() == "a::h").unwrap();
        assert_eq!(g.score, 2.0);
        assert_eq!(h.score, 1.0);
        assert_eq!(g.role, "neighbor");
    }

    #[test]
    fn nodes_are_ranked_highest_score_first() {
        let target = StableId::new("a::f").unwrap();
        let edges = vec![edge("x.rs", "a::low"), edge("y.rs", "a::high"), edge("z.rs", "a::high")];
        let (nodes, _) = score_neighborhood(&target, edges);
        let ranked: Vec<&str> = nodes.iter().map(|n| n.stable_id.as_str()).collect();
        assert_eq!(ranked[0], "a::high");
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsagePath {
    pub entrypoint: StableId,
    pub hops: Vec<StableId>,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceUsageFacts {
    pub paths: Vec<UsagePath>,
}

/// `trace_usage(stable_id, max_paths, max_depth)`: shortest causal paths
/// from any detected entrypoint to `stable_id`, found by BFS over callers
/// (the reverse call graph) starting at the target and walking outward
/// until an entrypoint is hit, then ranking shortest-first with confidence
/// as the product of a fixed per-hop edge confidence.
pub async fn trace_usage(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    stable_id: &StableId,
    max_paths: usize,
    max_depth: u8,
) -> Result<CompositeResult<TraceUsageFacts>, CkbError> {
    let repo_state_id = repo_state.id(mode);
    let args = (stable_id.clone(), max_paths, max_depth);
    engine
        .run_cached("trace_usage", &args, repo_state_id, || {
            trace_usage_inner(engine, repo_state, mode, stable_id, max_paths, max_depth)
        })
        .await
}

async fn trace_usage_inner(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    stable_id: &StableId,
    max_paths: usize,
    max_depth: u8,
) -> Result<CompositeResult<TraceUsageFacts>, CkbError> {
    let max_depth = Depth::new(max_depth.max(1), 5)?.get();
    let repo_state_id = repo_state.id(mode);
    let mut provenance = engine.new_provenance_builder(repo_state, mode);

    let entrypoints_answers = engine
        .fan_out(Capability::EntrypointHints, FactQuery::EntrypointHints, DEFAULT_QUERY_BUDGET, &mut provenance)
        .await?;
    let entrypoint_ids: std::collections::HashSet<StableId> = entrypoints_answers
        .iter()
        .flat_map(|a| a.answer.entrypoints.iter().map(|e| e.stable_id.clone()))
        .collect();

    const HOP_CONFIDENCE: f32 = 0.9;
    let mut paths = Vec::new();
    let mut queue: VecDeque<(StableId, Vec<StableId>)> = VecDeque::new();
    queue.push_back((stable_id.clone(), Vec::new()));
    let mut visited = std::collections::HashSet::new();
    visited.insert(stable_id.clone());

    while let Some((current, hops)) = queue.pop_front() {
        if hops.len() as u8 >= max_depth {
            continue;
        }
        let callers = engine.facts().call_graph_neighbors(repo_state_id, &current, Direction::Callers, 1);
        for edge in callers {
            let caller = match engine.facts().symbol_containing(
                repo_state_id,
                &edge.reference.from_location.file_id,
                edge.reference.from_location.start_line,
            ) {
                Some(id) => id,
                None => continue,
            };
            if !visited.insert(caller.clone()) {
                continue;
            }
            let mut next_hops = hops.clone();
            next_hops.push(caller.clone());
            if entrypoint_ids.contains(&caller) {
                paths.push(UsagePath {
                    entrypoint: caller,
                    hops: next_hops,
                    confidence: HOP_CONFIDENCE.powi((hops.len() + 1) as i32),
                });
                if paths.len() >= max_paths {
                    break;
                }
            } else {
                queue.push_back((caller, next_hops));
            }
        }
        if paths.len() >= max_paths {
            break;
        }
    }

    paths.sort_by(|a, b| {
        a.hops
            .len()
            .cmp(&b.hops.len())
            .then(b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal))
    });
    paths.truncate(max_paths);

    let sealed = provenance.seal();
    Ok(CompositeResult::new(TraceUsageFacts { paths }, Vec::new(), sealed))
}
