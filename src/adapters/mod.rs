//! Backend Adapters: a uniform capability contract over
//! heterogeneous code-intelligence sources. The Engine dispatches by
//! capability, never by concrete adapter type.

pub mod git;
pub mod lsp;
pub mod scip;
pub mod telemetry;
pub mod tree_sitter;

use crate::error::CkbError;
use crate::repo_state::RepoState;
use crate::types::{
    CallEdge, CommitTouch, Confidence, FileRecord, ModuleRecord, Reference, StableId, Symbol,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// The closed capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ResolveSymbol,
    FindRefs,
    CallEdges,
    Blame,
    Diff,
    CommitsForPath,
    EntrypointHints,
    Complexity,
    TelemetryUsage,
}

/// Direction for call-graph traversal queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Callers,
    Callees,
    Both,
}

/// What the Engine is asking an adapter to answer. One variant per
/// capability; adapters ignore queries outside their declared capability set
/// (the Engine never routes them there in the first place).
#[derive(Debug, Clone)]
pub enum FactQuery {
    ResolveSymbol { stable_id: StableId },
    SearchSymbols { query: String, limit: usize },
    FindReferences { stable_id: StableId, include_tests: bool },
    CallEdges { stable_id: StableId, direction: Direction, depth: u8 },
    Blame { file_id: String, path: String },
    Diff { base: String, head: String },
    CommitsForPath { file_id: String, path: String },
    EntrypointHints,
    Complexity { file_id: String, path: String },
    TelemetryUsage { stable_id: StableId },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlameLine {
    pub line: u32,
    pub commit_id: String,
    pub author: String,
}

#[derive(Debug, Clone)]
pub struct DiffHunk {
    pub file_id: String,
    pub path: String,
    pub added_lines: Vec<u32>,
    pub removed_lines: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct EntrypointHint {
    pub stable_id: StableId,
    pub basis: String,
    pub fan_out: usize,
}

#[derive(Debug, Clone)]
pub struct ComplexityReport {
    pub file_id: String,
    pub cyclomatic: u32,
    pub line_count: u32,
}

/// The partial data an adapter hands back for one `FactQuery`.
#[derive(Debug, Clone, Default)]
pub struct PartialAnswer {
    pub symbols: Vec<Symbol>,
    pub references: Vec<Reference>,
    pub call_edges: Vec<CallEdge>,
    pub files: Vec<FileRecord>,
    pub modules: Vec<ModuleRecord>,
    pub commits: Vec<CommitTouch>,
    pub blame: Vec<BlameLine>,
    pub diff_hunks: Vec<DiffHunk>,
    pub entrypoints: Vec<EntrypointHint>,
    pub complexity: Vec<ComplexityReport>,
    pub telemetry_usage: std::collections::HashMap<String, u64>,
    /// Per-capability confidence, used by the Engine's merge step to prefer
    /// the backend with the highest declared capability score.
    pub confidence: Confidence,
}

/// What flows into `provenance.backends[]` and `index_freshness` for one
/// adapter call.
#[derive(Debug, Clone)]
pub struct ProvenanceFragment {
    pub backend_id: String,
    pub capabilities_used: Vec<Capability>,
    pub duration_ms: u64,
    pub data_sources: Vec<String>,
    pub index_freshness: Option<IndexFreshness>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexFreshness {
    pub stale_against_head: bool,
    pub last_indexed_commit: String,
    pub head_commit: String,
}

/// The uniform adapter contract.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn backend_id(&self) -> &str;

    fn describe(&self) -> Vec<Capability>;

    /// Bind the adapter to a concrete repo state. Adapters are
    /// side-effect-free on the repository itself.
    async fn prepare(&self, repo_state: &RepoState) -> Result<(), CkbError>;

    async fn answer(
        &self,
        query: &FactQuery,
        deadline: Instant,
    ) -> Result<(PartialAnswer, ProvenanceFragment), CkbError>;

    /// Declared cost used to split the shared query deadline proportionally
    /// across whichever adapters are answering a given query.
    fn estimated_cost_ms(&self, query: &FactQuery) -> u64;
}

/// Whether `deadline` has already passed; adapters should check this before
/// doing real work so a cancelled/expired query never blocks on I/O.
pub fn past_deadline(deadline: Instant) -> bool {
    Instant::now() >= deadline
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn past_deadline_detects_expiry() {
        let deadline = Instant::now() - std::time::Duration::from_millis(1);
        assert!(past_deadline(deadline));
    }
}
