//! Repo State: `H(head_commit || dirty_fingerprint)`.
//!
//! Walks the working tree via `git::repository::GitRepository`; hashing uses
//! `xxhash-rust` for speed over a potentially large dirty-file set.

use crate::error::CkbError;
use crate::types::{RepoStateId, RepoStateMode};
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::Xxh3;

/// A single tracked-file fact folded into the dirty fingerprint.
struct DirtyEntry {
    path: String,
    size: u64,
    mtime_secs: i64,
}

/// Computes and holds the repo-state identity for one repository root.
pub struct RepoState {
    root: PathBuf,
    head_commit: String,
    dirty_entries: Vec<DirtyEntry>,
}

impl RepoState {
    /// Compute the repo state for `root` using `git2` to find HEAD and the
    /// set of tracked files with unstaged edits.
    #[cfg(feature = "git-integration")]
    pub fn compute(root: impl AsRef<Path>) -> Result<Self, CkbError> {
        let root = root.as_ref().to_path_buf();
        let repo = git2::Repository::open(&root)
            .map_err(|e| CkbError::InvalidArgument(format!("not a git repository: {e}")))?;

        let head_commit = repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .map(|c| c.id().to_string())
            .unwrap_or_else(|_| "0".repeat(40));

        let mut dirty_entries = Vec::new();
        if let Ok(statuses) = repo.statuses(None) {
            for entry in statuses.iter() {
                if entry.status().is_wt_new()
                    || entry.status().is_wt_modified()
                    || entry.status().is_wt_deleted()
                    || entry.status().is_index_modified()
                    || entry.status().is_index_new()
                {
                    let Some(path) = entry.path() else { continue };
                    let full = root.join(path);
                    let (size, mtime_secs) = std::fs::metadata(&full)
                        .map(|m| {
                            let mtime = m
                                .modified()
                                .ok()
                                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                                .map(|d| d.as_secs() as i64)
                                .unwrap_or(0);
                            (m.len(), mtime)
                        })
                        .unwrap_or((0, 0));
                    dirty_entries.push(DirtyEntry {
                        path: path.to_string(),
                        size,
                        mtime_secs,
                    });
                }
            }
        }
        dirty_entries.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(Self {
            root,
            head_commit,
            dirty_entries,
        })
    }

    #[cfg(not(feature = "git-integration"))]
    pub fn compute(root: impl AsRef<Path>) -> Result<Self, CkbError> {
        Ok(Self {
            root: root.as_ref().to_path_buf(),
            head_commit: "0".repeat(40),
            dirty_entries: Vec::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn head_commit(&self) -> &str {
        &self.head_commit
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty_entries.is_empty()
    }

    /// Identity for the given mode. `head` hashes only the commit id so it is
    /// insensitive to uncommitted edits (shared-cache friendly); `full`
    /// folds in the Merkle-like fingerprint of dirty tracked files.
    pub fn id(&self, mode: RepoStateMode) -> RepoStateId {
        let mut hasher = Xxh3::new();
        hasher.update(self.head_commit.as_bytes());
        if matches!(mode, RepoStateMode::Full) {
            for entry in &self.dirty_entries {
                hasher.update(entry.path.as_bytes());
                hasher.update(&entry.size.to_le_bytes());
                hasher.update(&entry.mtime_secs.to_le_bytes());
            }
        }
        let low = hasher.digest();
        let high = {
            let mut h2 = Xxh3::with_seed(1);
            h2.update(self.head_commit.as_bytes());
            if matches!(mode, RepoStateMode::Full) {
                for entry in &self.dirty_entries {
                    h2.update(entry.path.as_bytes());
                }
            }
            h2.digest()
        };
        RepoStateId::from_hash(((high as u128) << 64) | low as u128)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_repo(dir: &Path) {
        std::process::Command::new("git")
            .args(["init", "-q"])
            .arg(dir)
            .status()
            .expect("git init");
        std::process::Command::new("git")
            .args(["-C", dir.to_str().unwrap(), "config", "user.email", "t@t.com"])
            .status()
            .unwrap();
        std::process::Command::new("git")
            .args(["-C", dir.to_str().unwrap(), "config", "user.name", "t"])
            .status()
            .unwrap();
        std::fs::write(dir.join("a.txt"), "hello").unwrap();
        std::process::Command::new("git")
            .args(["-C", dir.to_str().unwrap(), "add", "-A"])
            .status()
            .unwrap();
        std::process::Command::new("git")
            .args(["-C", dir.to_str().unwrap(), "commit", "-q", "-m", "init"])
            .status()
            .unwrap();
    }

    #[test]
    fn head_mode_is_insensitive_to_dirty_edits() {
        let tmp = tempfile::tempdir().unwrap();
        init_repo(tmp.path());

        let before = RepoState::compute(tmp.path()).unwrap().id(RepoStateMode::Head);
        std::fs::write(tmp.path().join("a.txt"), "modified content").unwrap();
        let after = RepoState::compute(tmp.path()).unwrap().id(RepoStateMode::Head);

        assert_eq!(before, after);
    }

    #[test]
    fn full_mode_changes_with_dirty_edits() {
        let tmp = tempfile::tempdir().unwrap();
        init_repo(tmp.path());

        let before = RepoState::compute(tmp.path()).unwrap().id(RepoStateMode::Full);
        std::fs::write(tmp.path().join("a.txt"), "modified content").unwrap();
        let after = RepoState::compute(tmp.path()).unwrap().id(RepoStateMode::Full);

        assert_ne!(before, after);
    }
}
