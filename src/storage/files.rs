//! File metadata table.

use crate::error::CkbError;
use crate::types::{FileRecord, RepoStateId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Default, Serialize, Deserialize)]
struct Snapshot {
    entries: Vec<(RepoStateId, FileRecord)>,
}

#[derive(Default)]
pub struct FileTable {
    inner: DashMap<(RepoStateId, String), FileRecord>,
}

impl FileTable {
    pub(crate) async fn load(root: &Path) -> Result<Self, CkbError> {
        let snap: Snapshot = super::load_snapshot(root, "files").await?;
        let inner = DashMap::new();
        for (repo_state_id, file) in snap.entries {
            inner.insert((repo_state_id, file.id.clone()), file);
        }
        Ok(Self { inner })
    }

    pub(crate) async fn snapshot(&self, root: &Path) -> Result<(), CkbError> {
        let entries = self
            .inner
            .iter()
            .map(|e| (e.key().0, e.value().clone()))
            .collect();
        super::save_snapshot(root, "files", &Snapshot { entries }).await
    }

    pub fn upsert(&self, repo_state_id: RepoStateId, file: FileRecord) {
        self.inner.insert((repo_state_id, file.id.clone()), file);
    }

    pub fn get(&self, repo_state_id: RepoStateId, file_id: &str) -> Option<FileRecord> {
        self.inner
            .get(&(repo_state_id, file_id.to_string()))
            .map(|e| e.value().clone())
    }

    pub fn all_for_repo_state(&self, repo_state_id: RepoStateId) -> Vec<FileRecord> {
        self.inner
            .iter()
            .filter(|e| e.key().0 == repo_state_id)
            .map(|e| e.value().clone())
            .collect()
    }
}
