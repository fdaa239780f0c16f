//! Git adapter: `blame`, `diff`, `commits_for_path`.

use super::{Adapter, BlameLine, Capability, DiffHunk, FactQuery, PartialAnswer, ProvenanceFragment};
use crate::error::CkbError;
use crate::git::repository::GitRepository;
use crate::git::types::GitOptions;
use crate::repo_state::RepoState;
use crate::types::{CommitTouch, Confidence};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::time::Instant;

pub struct GitAdapter {
    repo: RwLock<Option<GitRepository>>,
}

impl GitAdapter {
    pub fn new() -> Self {
        Self {
            repo: RwLock::new(None),
        }
    }
}

impl Default for GitAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for GitAdapter {
    fn backend_id(&self) -> &str {
        "git"
    }

    fn describe(&self) -> Vec<Capability> {
        vec![Capability::Blame, Capability::Diff, Capability::CommitsForPath]
    }

    async fn prepare(&self, repo_state: &RepoState) -> Result<(), CkbError> {
        let repo = GitRepository::open(repo_state.root(), GitOptions::default())
            .map_err(|e| CkbError::BackendUnavailable(format!("git adapter: {e}")))?;
        *self.repo.write() = Some(repo);
        Ok(())
    }

    async fn answer(
        &self,
        query: &FactQuery,
        deadline: Instant,
    ) -> Result<(PartialAnswer, ProvenanceFragment), CkbError> {
        if super::past_deadline(deadline) {
            return Err(CkbError::Timeout("git adapter: deadline already passed".into()));
        }
        let start = Instant::now();
        let guard = self.repo.read();
        let repo = guard
            .as_ref()
            .ok_or_else(|| CkbError::BackendUnavailable("git adapter not prepared".into()))?;

        let mut answer = PartialAnswer {
            confidence: Confidence::new(1.0),
            ..Default::default()
        };
        let (capability, data_source) = match query {
            FactQuery::Blame { file_id, path } => {
                let lines = repo
                    .blame_file(path)
                    .map_err(|e| CkbError::BackendUnavailable(format!("git blame failed: {e}")))?;
                answer.blame = lines
                    .into_iter()
                    .map(|l| BlameLine {
                        line: l.line,
                        commit_id: l.commit_sha,
                        author: l.author_name,
                    })
                    .collect();
                (Capability::Blame, file_id.clone())
            }
            FactQuery::Diff { base, head } => {
                let hunks = repo
                    .diff(base, head)
                    .map_err(|e| CkbError::BackendUnavailable(format!("git diff failed: {e}")))?;
                answer.diff_hunks = hunks
                    .into_iter()
                    .map(|h| DiffHunk {
                        file_id: crate::types::file_id_for_path(&h.path),
                        path: h.path,
                        added_lines: h.added_lines,
                        removed_lines: h.removed_lines,
                    })
                    .collect();
                (Capability::Diff, format!("{base}..{head}"))
            }
            FactQuery::CommitsForPath { file_id, path } => {
                let commits = repo
                    .commits_for_path(path, Some(1000))
                    .map_err(|e| CkbError::BackendUnavailable(format!("git log failed: {e}")))?;
                answer.commits = commits
                    .into_iter()
                    .map(|c| CommitTouch {
                        commit_id: c.sha,
                        author: c.author_name,
                        time: c.timestamp,
                        file_id: file_id.clone(),
                        additions: c.insertions as u32,
                        deletions: c.deletions as u32,
                    })
                    .collect();
                (Capability::CommitsForPath, path.clone())
            }
            other => {
                return Err(CkbError::InvalidArgument(format!(
                    "git adapter cannot answer {other:?}"
                )))
            }
        };

        let fragment = ProvenanceFragment {
            backend_id: self.backend_id().to_string(),
            capabilities_used: vec![capability],
            duration_ms: start.elapsed().as_millis() as u64,
            data_sources: vec![data_source],
            index_freshness: None,
        };
        Ok((answer, fragment))
    }

    fn estimated_cost_ms(&self, query: &FactQuery) -> u64 {
        match query {
            FactQuery::CommitsForPath { .. } => 200,
            FactQuery::Diff { .. } => 150,
            _ => 50,
        }
    }
}
