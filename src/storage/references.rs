//! Reference table: edges from a location to a symbol.

use crate::error::CkbError;
use crate::types::{RepoStateId, Reference, StableId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Default, Serialize, Deserialize)]
struct Snapshot {
    entries: Vec<(RepoStateId, Reference)>,
}

#[derive(Default)]
pub struct ReferenceTable {
    inner: DashMap<RepoStateId, Vec<Reference>>,
}

impl ReferenceTable {
    pub(crate) async fn load(root: &Path) -> Result<Self, CkbError> {
        let snap: Snapshot = super::load_snapshot(root, "references").await?;
        let inner = DashMap::new();
        for (repo_state_id, reference) in snap.entries {
            inner.entry(repo_state_id).or_insert_with(Vec::new).push(reference);
        }
        Ok(Self { inner })
    }

    pub(crate) async fn snapshot(&self, root: &Path) -> Result<(), CkbError> {
        let mut entries = Vec::new();
        for entry in self.inner.iter() {
            for reference in entry.value() {
                entries.push((*entry.key(), reference.clone()));
            }
        }
        super::save_snapshot(root, "references", &Snapshot { entries }).await
    }

    /// Insert a batch of references, deduplicating by `(from_location,
    /// to_stable_id, kind)` so Storage never accumulates duplicates across
    /// repeated ingestion runs for the same repo state.
    pub fn insert_batch(&self, repo_state_id: RepoStateId, batch: Vec<Reference>) {
        let mut slot = self.inner.entry(repo_state_id).or_insert_with(Vec::new);
        let mut seen: std::collections::HashSet<_> = slot.iter().map(|r| r.dedup_key()).collect();
        for reference in batch {
            let key = reference.dedup_key();
            if seen.insert(key) {
                slot.push(reference);
            }
        }
    }

    pub fn references_to(&self, repo_state_id: RepoStateId, target: &StableId) -> Vec<Reference> {
        self.inner
            .get(&repo_state_id)
            .map(|v| {
                v.iter()
                    .filter(|r| &r.to_stable_id == target)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn all_for_repo_state(&self, repo_state_id: RepoStateId) -> Vec<Reference> {
        self.inner.get(&repo_state_id).map(|v| v.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Location, ReferenceKind};

    fn reference(file: &str, target: &str) -> Reference {
        Reference {
            from_location: Location::point(file, 10, 0),
            to_stable_id: StableId::new(target).unwrap(),
            kind: ReferenceKind::Call,
            is_test: false,
        }
    }

    #[test]
    fn insert_batch_deduplicates() {
        let table = ReferenceTable::default();
        let repo = RepoStateId::from_hash(1);
        table.insert_batch(repo, vec![reference("b.go", "A"), reference("b.go", "A")]);
        assert_eq!(table.all_for_repo_state(repo).len(), 1);
    }

    #[test]
    fn references_to_filters_by_target() {
        let table = ReferenceTable::default();
        let repo = RepoStateId::from_hash(1);
        table.insert_batch(
            repo,
            vec![reference("b.go", "A"), reference("c.go", "B")],
        );
        let to_a = table.references_to(repo, &StableId::new("A").unwrap());
        assert_eq!(to_a.len(), 1);
        assert_eq!(to_a[0].from_location.file_id, "b.go");
    }
}
