//! Symbol table: `(repo_state_id, stable_id)` unique, immutable per repo
//! state.

use crate::error::CkbError;
use crate::types::{RepoStateId, StableId, Symbol};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Default, Serialize, Deserialize)]
struct Snapshot {
    entries: Vec<Symbol>,
}

#[derive(Default)]
pub struct SymbolTable {
    inner: DashMap<(RepoStateId, StableId), Symbol>,
}

impl SymbolTable {
    pub(crate) async fn load(root: &Path) -> Result<Self, CkbError> {
        let snap: Snapshot = super::load_snapshot(root, "symbols").await?;
        let inner = DashMap::new();
        for symbol in snap.entries {
            inner.insert((symbol.repo_state_id, symbol.stable_id.clone()), symbol);
        }
        Ok(Self { inner })
    }

    pub(crate) async fn snapshot(&self, root: &Path) -> Result<(), CkbError> {
        let entries: Vec<Symbol> = self.inner.iter().map(|e| e.value().clone()).collect();
        super::save_snapshot(root, "symbols", &Snapshot { entries }).await
    }

    /// Insert or replace a symbol, enforcing the unique-key invariant by
    /// construction (the key *is* the uniqueness constraint).
    pub fn upsert(&self, symbol: Symbol) {
        self.inner
            .insert((symbol.repo_state_id, symbol.stable_id.clone()), symbol);
    }

    pub fn get(&self, repo_state_id: RepoStateId, stable_id: &StableId) -> Option<Symbol> {
        self.inner
            .get(&(repo_state_id, stable_id.clone()))
            .map(|e| e.value().clone())
    }

    /// All symbols for a repo state, for substring search / listings.
    pub fn all_for_repo_state(&self, repo_state_id: RepoStateId) -> Vec<Symbol> {
        self.inner
            .iter()
            .filter(|e| e.key().0 == repo_state_id)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Confidence, Location, SymbolKind, Visibility};

    fn sample(repo: RepoStateId, id: &str) -> Symbol {
        Symbol {
            repo_state_id: repo,
            stable_id: StableId::new(id).unwrap(),
            name: id.to_string(),
            kind: SymbolKind::Function,
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

    #[test]
    fn upsert_then_get_round_trips() {
        let table = SymbolTable::default();
        let repo = RepoStateId::from_hash(1);
        table.upsert(sample(repo, "A"));
        let found = table.get(repo, &StableId::new("A").unwrap());
        assert!(found.is_some());
        assert_eq!(found.unwrap().name, "A");
    }

    #[test]
    fn distinct_repo_states_do_not_collide() {
        let table = SymbolTable::default();
        table.upsert(sample(RepoStateId::from_hash(1), "A"));
        table.upsert(sample(RepoStateId::from_hash(2), "A"));
        assert_eq!(table.all_for_repo_state(RepoStateId::from_hash(1)).len(), 1);
        assert_eq!(table.all_for_repo_state(RepoStateId::from_hash(2)).len(), 1);
    }
}
