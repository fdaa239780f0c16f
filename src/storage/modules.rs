//! Module metadata table. Modules are opaque labels to the Engine, produced
//! by language-specific packaging rules in the adapters.

use crate::error::CkbError;
use crate::types::{ModuleRecord, RepoStateId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Default, Serialize, Deserialize)]
struct Snapshot {
    entries: Vec<(RepoStateId, ModuleRecord)>,
}

#[derive(Default)]
pub struct ModuleTable {
    inner: DashMap<(RepoStateId, String), ModuleRecord>,
}

impl ModuleTable {
    pub(crate) async fn load(root: &Path) -> Result<Self, CkbError> {
        let snap: Snapshot = super::load_snapshot(root, "modules").await?;
        let inner = DashMap::new();
        for (repo_state_id, module) in snap.entries {
            inner.insert((repo_state_id, module.id.clone()), module);
        }
        Ok(Self { inner })
    }

    pub(crate) async fn snapshot(&self, root: &Path) -> Result<(), CkbError> {
        let entries = self
            .inner
            .iter()
            .map(|e| (e.key().0, e.value().clone()))
            .collect();
        super::save_snapshot(root, "modules", &Snapshot { entries }).await
    }

    pub fn upsert(&self, repo_state_id: RepoStateId, module: ModuleRecord) {
        self.inner.insert((repo_state_id, module.id.clone()), module);
    }

    pub fn get(&self, repo_state_id: RepoStateId, module_id: &str) -> Option<ModuleRecord> {
        self.inner
            .get(&(repo_state_id, module_id.to_string()))
            .map(|e| e.value().clone())
    }

    pub fn all_for_repo_state(&self, repo_state_id: RepoStateId) -> Vec<ModuleRecord> {
        self.inner
            .iter()
            .filter(|e| e.key().0 == repo_state_id)
            .map(|e| e.value().clone())
            .collect()
    }

    /// The module owning a given file, for blast-radius aggregation.
    pub fn module_for_file(&self, repo_state_id: RepoStateId, file_id: &str) -> Option<ModuleRecord> {
        self.inner
            .iter()
            .filter(|e| e.key().0 == repo_state_id)
            .map(|e| e.value().clone())
            .find(|m| m.file_ids.iter().any(|f| f == file_id))
    }
}
