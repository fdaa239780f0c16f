//! Commit-touch table sourced from git.

use crate::error::CkbError;
use crate::types::{CommitTouch, RepoStateId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Default, Serialize, Deserialize)]
struct Snapshot {
    entries: Vec<(RepoStateId, CommitTouch)>,
}

#[derive(Default)]
pub struct CommitTable {
    inner: DashMap<RepoStateId, Vec<CommitTouch>>,
}

impl CommitTable {
    pub(crate) async fn load(root: &Path) -> Result<Self, CkbError> {
        let snap: Snapshot = super::load_snapshot(root, "commits").await?;
        let inner = DashMap::new();
        for (repo_state_id, touch) in snap.entries {
            inner.entry(repo_state_id).or_insert_with(Vec::new).push(touch);
        }
        Ok(Self { inner })
    }

    pub(crate) async fn snapshot(&self, root: &Path) -> Result<(), CkbError> {
        let mut entries = Vec::new();
        for entry in self.inner.iter() {
            for touch in entry.value() {
                entries.push((*entry.key(), touch.clone()));
            }
        }
        super::save_snapshot(root, "commits", &Snapshot { entries }).await
    }

    pub fn insert_batch(&self, repo_state_id: RepoStateId, batch: Vec<CommitTouch>) {
        self.inner.entry(repo_state_id).or_insert_with(Vec::new).extend(batch);
    }

    pub fn touches_for_path(&self, repo_state_id: RepoStateId, file_id: &str) -> Vec<CommitTouch> {
        self.inner
            .get(&repo_state_id)
            .map(|v| v.iter().filter(|t| t.file_id == file_id).cloned().collect())
            .unwrap_or_default()
    }

    pub fn all_for_repo_state(&self, repo_state_id: RepoStateId) -> Vec<CommitTouch> {
        self.inner.get(&repo_state_id).map(|v| v.clone()).unwrap_or_default()
    }
}
