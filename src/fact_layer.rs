//! Fact Layer: typed operations over Storage, the thin
//! seam between raw tables and the Engine's fan-out. Every method here is a
//! single-repo-state read or a merge-and-persist write; no cross-backend
//! orchestration happens at this layer, that is the Engine's job.

use crate::error::CkbError;
use crate::storage::Store;
use crate::types::{
    CallEdge, CommitTouch, FileRecord, ModuleRecord, Reference, RepoStateId, StableId, Symbol,
};
use std::sync::Arc;

pub struct FactLayer {
    store: Arc<Store>,
}

impl FactLayer {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn resolve_symbol(&self, repo_state_id: RepoStateId, stable_id: &StableId) -> Option<Symbol> {
        self.store.symbols.get(repo_state_id, stable_id)
    }

    pub fn search_symbols(&self, repo_state_id: RepoStateId, query: &str, limit: usize) -> Vec<Symbol> {
        let needle = query.to_lowercase();
        let mut matches: Vec<Symbol> = self
            .store
            .symbols
            .all_for_repo_state(repo_state_id)
            .into_iter()
            .filter(|s| s.name.to_lowercase().contains(&needle))
            .collect();
        matches.sort_by(|a, b| {
            b.kind
                .priority()
                .cmp(&a.kind.priority())
                .then(b.visibility.weight().cmp(&a.visibility.weight()))
                .then(a.name.cmp(&b.name))
        });
        matches.truncate(limit);
        matches
    }

    pub fn find_references(
        &self,
        repo_state_id: RepoStateId,
        stable_id: &StableId,
        include_tests: bool,
    ) -> Vec<Reference> {
        let mut refs = self.store.references.references_to(repo_state_id, stable_id);
        if !include_tests {
            refs.retain(|r| !r.is_test);
        }
        refs
    }

    /// Merge a batch of freshly-fetched references into Storage, deduping
    /// against what's already there.
    pub fn merge_references(&self, repo_state_id: RepoStateId, batch: Vec<Reference>) {
        self.store.references.insert_batch(repo_state_id, batch);
    }

    pub fn merge_symbols(&self, symbols: Vec<Symbol>) {
        for symbol in symbols {
            self.store.symbols.upsert(symbol);
        }
    }

    pub fn merge_files(&self, repo_state_id: RepoStateId, files: Vec<FileRecord>) {
        for file in files {
            self.store.files.upsert(repo_state_id, file);
        }
    }

    pub fn merge_modules(&self, repo_state_id: RepoStateId, modules: Vec<ModuleRecord>) {
        for module in modules {
            self.store.modules.upsert(repo_state_id, module);
        }
    }

    pub fn merge_commits(&self, repo_state_id: RepoStateId, touches: Vec<CommitTouch>) {
        self.store.commits.insert_batch(repo_state_id, touches);
    }

    pub fn list_files(&self, repo_state_id: RepoStateId) -> Vec<FileRecord> {
        self.store.files.all_for_repo_state(repo_state_id)
    }

    pub fn list_modules(&self, repo_state_id: RepoStateId) -> Vec<ModuleRecord> {
        self.store.modules.all_for_repo_state(repo_state_id)
    }

    pub fn module_for_file(&self, repo_state_id: RepoStateId, file_id: &str) -> Option<ModuleRecord> {
        self.store.modules.module_for_file(repo_state_id, file_id)
    }

    pub fn commits_for_path(&self, repo_state_id: RepoStateId, file_id: &str) -> Vec<CommitTouch> {
        self.store.commits.touches_for_path(repo_state_id, file_id)
    }

    /// The stable id of the symbol whose body contains `location`, by
    /// same-file line-range containment. Used to turn a `Call` reference's
    /// source location into a caller identity.
    pub fn symbol_containing(&self, repo_state_id: RepoStateId, file_id: &str, line: u32) -> Option<StableId> {
        self.store
            .symbols
            .all_for_repo_state(repo_state_id)
            .into_iter()
            .filter(|s| s.location.file_id == file_id)
            .filter(|s| s.location.start_line <= line && line <= s.location.end_line)
            .min_by_key(|s| s.location.end_line.saturating_sub(s.location.start_line))
            .map(|s| s.stable_id)
    }

    /// Neighbors in the call graph for `stable_id`, recursive up to `depth`
    /// hops. Callees are `Call`-kind references whose source location falls
    /// inside `stable_id`'s own body; callers are symbols whose body
    /// contains a `Call` reference targeting `stable_id`.
    pub fn call_graph_neighbors(
        &self,
        repo_state_id: RepoStateId,
        stable_id: &StableId,
        direction: crate::adapters::Direction,
        depth: u8,
    ) -> Vec<CallEdge> {
        use crate::adapters::Direction;
        use crate::types::ReferenceKind;
        use std::collections::{HashSet, VecDeque};

        let all_refs = self.store.references.all_for_repo_state(repo_state_id);
        let call_refs: Vec<&Reference> = all_refs.iter().filter(|r| r.kind == ReferenceKind::Call).collect();

        let mut frontier: VecDeque<StableId> = VecDeque::new();
        frontier.push_back(stable_id.clone());
        let mut visited: HashSet<StableId> = HashSet::new();
        visited.insert(stable_id.clone());
        let mut edges = Vec::new();

        for _ in 0..depth.max(1) {
            let mut next_frontier = VecDeque::new();
            while let Some(current) = frontier.pop_front() {
                let Some(current_symbol) = self.resolve_symbol(repo_state_id, &current) else {
                    continue;
                };

                if matches!(direction, Direction::Callees | Direction::Both) {
                    for reference in &call_refs {
                        if reference.from_location.file_id != current_symbol.location.file_id {
                            continue;
                        }
                        if reference.from_location.start_line < current_symbol.location.start_line
                            || reference.from_location.start_line > current_symbol.location.end_line
                        {
                            continue;
                        }
                        if visited.insert(reference.to_stable_id.clone()) {
                            edges.push(CallEdge {
                                reference: (*reference).clone(),
                                call_site_expr: None,
                            });
                            next_frontier.push_back(reference.to_stable_id.clone());
                        }
                    }
                }

                if matches!(direction, Direction::Callers | Direction::Both) {
                    for reference in &call_refs {
                        if reference.to_stable_id != current {
                            continue;
                        }
                        let Some(caller_id) = self.symbol_containing(
                            repo_state_id,
                            &reference.from_location.file_id,
                            reference.from_location.start_line,
                        ) else {
                            continue;
                        };
                        if visited.insert(caller_id.clone()) {
                            edges.push(CallEdge {
                                reference: (*reference).clone(),
                                call_site_expr: None,
                            });
                            next_frontier.push_back(caller_id);
                        }
                    }
                }
            }
            frontier = next_frontier;
        }
        edges
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }
}

pub type FactLayerResult<T> = Result<T, CkbError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Confidence, Location, SymbolKind, Visibility};

    fn sample_symbol(repo: RepoStateId, id: &str, kind: SymbolKind) -> Symbol {
        Symbol {
            repo_state_id: repo,
            stable_id: StableId::new(id).unwrap(),
            name: id.to_string(),
            kind,
            signature: format!("fn {id}()"),
            signature_normalized: format!("fn {id}()"),
            module_id: "m1".into(),
            location: Location::point("f1", 1, 0),
            container_name: None,
            documentation: None,
            modifiers: vec![],
            visibility: Visibility::Public,
            visibility_confidence: Confidence::new(1.0),
        }
    }

    #[tokio::test]
    async fn search_symbols_ranks_by_kind_priority() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(tmp.path()).await.unwrap());
        let layer = FactLayer::new(store);
        let repo = RepoStateId::from_hash(1);
        layer.merge_symbols(vec![
            sample_symbol(repo, "alpha_var", SymbolKind::Variable),
            sample_symbol(repo, "alpha_type", SymbolKind::Type),
        ]);
        let results = layer.search_symbols(repo, "alpha", 10);
        assert_eq!(results[0].name, "alpha_type");
    }
}
