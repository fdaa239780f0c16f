//! SCIP adapter: `resolve_symbol`, `find_refs`, `call_edges`.
//!
//! Full SCIP protobuf decoding is a build-time/codegen concern outside this
//! repository's scope, so this adapter reads a
//! JSON-lines sidecar at `.ckb/scip-index.jsonl` — one record per symbol,
//! produced by an out-of-process indexer — the way `symbol_storage.rs`
//! reads its own persisted symbol entries.

use super::{
    Adapter, CallEdge, Capability, Direction, FactQuery, IndexFreshness, PartialAnswer,
    ProvenanceFragment,
};
use crate::error::CkbError;
use crate::repo_state::RepoState;
use crate::types::{
    Confidence, Location, Reference, ReferenceKind, StableId, Symbol, SymbolKind, Visibility,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

const SIDECAR_RELATIVE_PATH: &str = ".ckb/scip-index.jsonl";

#[derive(Debug, Deserialize)]
struct ScipRecord {
    stable_id: String,
    name: String,
    kind: SymbolKind,
    signature: String,
    #[serde(default)]
    signature_normalized: Option<String>,
    module_id: String,
    file_id: String,
    start_line: u32,
    start_col: u32,
    end_line: u32,
    end_col: u32,
    #[serde(default)]
    container_name: Option<String>,
    #[serde(default)]
    documentation: Option<String>,
    #[serde(default)]
    visibility: Option<Visibility>,
    #[serde(default)]
    references: Vec<ScipReference>,
    #[serde(default)]
    calls: Vec<ScipCall>,
}

#[derive(Debug, Deserialize)]
struct ScipReference {
    file_id: String,
    line: u32,
    col: u32,
    kind: ReferenceKind,
    #[serde(default)]
    is_test: bool,
}

#[derive(Debug, Deserialize)]
struct ScipCall {
    target_stable_id: String,
    file_id: String,
    line: u32,
    col: u32,
    #[serde(default)]
    call_site_expr: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SidecarMeta {
    #[serde(default)]
    indexed_commit: Option<String>,
}

struct Index {
    symbols: HashMap<String, Symbol>,
    references_to: HashMap<String, Vec<Reference>>,
    calls_from: HashMap<String, Vec<CallEdge>>,
    calls_to: HashMap<String, Vec<CallEdge>>,
    indexed_commit: Option<String>,
}

impl Default for Index {
    fn default() -> Self {
        Self {
            symbols: HashMap::new(),
            references_to: HashMap::new(),
            calls_from: HashMap::new(),
            calls_to: HashMap::new(),
            indexed_commit: None,
        }
    }
}

pub struct ScipAdapter {
    index: RwLock<Index>,
    head_commit: RwLock<String>,
}

impl ScipAdapter {
    pub fn new() -> Self {
        Self {
            index: RwLock::new(Index::default()),
            head_commit: RwLock::new(String::new()),
        }
    }
}

impl Default for ScipAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn sidecar_path(repo_root: &std::path::Path) -> PathBuf {
    repo_root.join(SIDECAR_RELATIVE_PATH)
}

fn build_index(contents: &str) -> Index {
    let mut index = Index::default();
    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("#meta ") {
            if let Ok(meta) = serde_json::from_str::<SidecarMeta>(rest) {
                index.indexed_commit = meta.indexed_commit;
            }
            continue;
        }
        let Ok(record) = serde_json::from_str::<ScipRecord>(trimmed) else {
            continue;
        };
        let Ok(stable_id) = StableId::new(record.stable_id.clone()) else {
            continue;
        };
        let location = Location {
            file_id: record.file_id.clone(),
            start_line: record.start_line,
            start_col: record.start_col,
            end_line: record.end_line,
            end_col: record.end_col,
        };
        let signature_normalized = record
            .signature_normalized
            .clone()
            .unwrap_or_else(|| record.signature.clone());
        let symbol = Symbol {
            repo_state_id: crate::types::RepoStateId::from_hash(0),
            stable_id: stable_id.clone(),
            name: record.name,
            kind: record.kind,
            signature: record.signature,
            signature_normalized,
            module_id: record.module_id,
            location,
            container_name: record.container_name,
            documentation: record.documentation,
            modifiers: Vec::new(),
            visibility: record.visibility.unwrap_or(Visibility::Unknown),
            visibility_confidence: Confidence::new(0.9),
        };

        for reference in record.references {
            let from_location = Location {
                file_id: reference.file_id,
                start_line: reference.line,
                start_col: reference.col,
                end_line: reference.line,
                end_col: reference.col,
            };
            index
                .references_to
                .entry(stable_id.as_str().to_string())
                .or_default()
                .push(Reference {
                    from_location,
                    to_stable_id: stable_id.clone(),
                    kind: reference.kind,
                    is_test: reference.is_test,
                });
        }

        for call in record.calls {
            let Ok(target) = StableId::new(call.target_stable_id.clone()) else {
                continue;
            };
            let from_location = Location {
                file_id: call.file_id,
                start_line: call.line,
                start_col: call.col,
                end_line: call.line,
                end_col: call.col,
            };
            let edge = CallEdge {
                reference: Reference {
                    from_location,
                    to_stable_id: target.clone(),
                    kind: ReferenceKind::Call,
                    is_test: false,
                },
                call_site_expr: call.call_site_expr,
            };
            index
                .calls_from
                .entry(stable_id.as_str().to_string())
                .or_default()
                .push(edge.clone());
            index
                .calls_to
                .entry(target.as_str().to_string())
                .or_default()
                .push(edge);
        }

        index.symbols.insert(stable_id.as_str().to_string(), symbol);
    }
    index
}

#[async_trait]
impl Adapter for ScipAdapter {
    fn backend_id(&self) -> &str {
        "scip"
    }

    fn describe(&self) -> Vec<Capability> {
        vec![Capability::ResolveSymbol, Capability::FindRefs, Capability::CallEdges]
    }

    async fn prepare(&self, repo_state: &RepoState) -> Result<(), CkbError> {
        let path = sidecar_path(repo_state.root());
        *self.head_commit.write() = repo_state.head_commit().to_string();
        let Ok(contents) = std::fs::read_to_string(&path) else {
            *self.index.write() = Index::default();
            return Ok(());
        };
        *self.index.write() = build_index(&contents);
        Ok(())
    }

    async fn answer(
        &self,
        query: &FactQuery,
        deadline: Instant,
    ) -> Result<(PartialAnswer, ProvenanceFragment), CkbError> {
        if super::past_deadline(deadline) {
            return Err(CkbError::Timeout("scip adapter: deadline already passed".into()));
        }
        let start = Instant::now();
        let index = self.index.read();
        if index.symbols.is_empty() {
            return Err(CkbError::BackendUnavailable(
                "scip adapter: no sidecar index present".into(),
            ));
        }

        let mut answer = PartialAnswer {
            confidence: Confidence::new(0.95),
            ..Default::default()
        };
        let (capability, data_source) = match query {
            FactQuery::ResolveSymbol { stable_id } => {
                let symbol = index
                    .symbols
                    .get(stable_id.as_str())
                    .cloned()
                    .ok_or_else(|| CkbError::NotFound(format!("unknown symbol {stable_id}")))?;
                answer.symbols = vec![symbol];
                (Capability::ResolveSymbol, stable_id.as_str().to_string())
            }
            FactQuery::SearchSymbols { query: needle, limit } => {
                let needle_lower = needle.to_lowercase();
                answer.symbols = index
                    .symbols
                    .values()
                    .filter(|s| s.name.to_lowercase().contains(&needle_lower))
                    .take(*limit)
                    .cloned()
                    .collect();
                (Capability::ResolveSymbol, format!("search:{needle}"))
            }
            FactQuery::FindReferences { stable_id, include_tests } => {
                let mut refs = index
                    .references_to
                    .get(stable_id.as_str())
                    .cloned()
                    .unwrap_or_default();
                if !include_tests {
                    refs.retain(|r| !r.is_test);
                }
                answer.references = refs;
                (Capability::FindRefs, stable_id.as_str().to_string())
            }
            FactQuery::CallEdges { stable_id, direction, depth: _ } => {
                let edges = match direction {
                    Direction::Callers => index.calls_to.get(stable_id.as_str()).cloned(),
                    Direction::Callees => index.calls_from.get(stable_id.as_str()).cloned(),
                    Direction::Both => {
                        let mut combined = index.calls_to.get(stable_id.as_str()).cloned().unwrap_or_default();
                        combined.extend(index.calls_from.get(stable_id.as_str()).cloned().unwrap_or_default());
                        Some(combined)
                    }
                }
                .unwrap_or_default();
                answer.call_edges = edges;
                (Capability::CallEdges, stable_id.as_str().to_string())
            }
            other => {
                return Err(CkbError::InvalidArgument(format!(
                    "scip adapter cannot answer {other:?}"
                )))
            }
        };

        let head_commit = self.head_commit.read().clone();
        let index_freshness = index.indexed_commit.as_ref().map(|indexed| IndexFreshness {
            stale_against_head: indexed != &head_commit,
            last_indexed_commit: indexed.clone(),
            head_commit: head_commit.clone(),
        });

        let fragment = ProvenanceFragment {
            backend_id: self.backend_id().to_string(),
            capabilities_used: vec![capability],
            duration_ms: start.elapsed().as_millis() as u64,
            data_sources: vec![data_source],
            index_freshness,
        };
        Ok((answer, fragment))
    }

    fn estimated_cost_ms(&self, _query: &FactQuery) -> u64 {
        10
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_index_parses_symbol_and_meta() {
        let contents = "#meta {\"indexed_commit\":\"abc123\"}\n\
             {\"stable_id\":\"rust:crate::foo\",\"name\":\"foo\",\"kind\":\"function\",\
             \"signature\":\"fn foo()\",\"module_id\":\"crate\",\"file_id\":\"f1\",\
             \"start_line\":1,\"start_col\":0,\"end_line\":3,\"end_col\":1}";
        let index = build_index(contents);
        assert_eq!(index.symbols.len(), 1);
        assert_eq!(index.indexed_commit.as_deref(), Some("abc123"));
    }

    #[test]
    fn build_index_skips_malformed_lines() {
        let index = build_index("not json\n{}\n");
        assert!(index.symbols.is_empty());
    }
}
