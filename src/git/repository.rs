//! Git repository reading: metadata, blame, diff, commit history for a path,
//! on top of `git2`-backed tree walking and commit metadata extraction.

use super::types::{BlameLineInfo, CommitInfo, DiffHunkInfo, GitOptions, RepositoryMetadata};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub struct GitRepository {
    #[cfg(feature = "git-integration")]
    repo: git2::Repository,
    path: PathBuf,
    #[allow(dead_code)]
    options: GitOptions,
}

impl GitRepository {
    pub fn open(path: impl AsRef<Path>, options: GitOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        #[cfg(feature = "git-integration")]
        {
            let repo = git2::Repository::open(&path)
                .with_context(|| format!("failed to open git repository at {path:?}"))?;
            Ok(Self { repo, path, options })
        }

        #[cfg(not(feature = "git-integration"))]
        {
            let _ = options;
            anyhow::bail!("git-integration feature not enabled");
        }
    }

    #[cfg(feature = "git-integration")]
    pub fn metadata(&self) -> Result<RepositoryMetadata> {
        let head = self.repo.head().context("failed to get repository HEAD")?;
        let branch_name = head.shorthand().unwrap_or("HEAD").to_string();
        let head_commit = head
            .peel_to_commit()
            .map(|c| c.id().to_string())
            .unwrap_or_default();

        let mut revwalk = self.repo.revwalk()?;
        revwalk.push_head()?;
        let commit_count = revwalk.count();

        let name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        let url = self
            .repo
            .find_remote("origin")
            .ok()
            .and_then(|r| r.url().map(String::from));

        Ok(RepositoryMetadata {
            name,
            url,
            path: self.path.clone(),
            default_branch: branch_name,
            commit_count,
            head_commit,
        })
    }

    #[cfg(not(feature = "git-integration"))]
    pub fn metadata(&self) -> Result<RepositoryMetadata> {
        anyhow::bail!("git-integration feature not enabled");
    }

    /// Per-line blame for one repo-relative path at HEAD.
    #[cfg(feature = "git-integration")]
    pub fn blame_file(&self, rel_path: &str) -> Result<Vec<BlameLineInfo>> {
        let blame = self
            .repo
            .blame_file(Path::new(rel_path), None)
            .with_context(|| format!("failed to blame {rel_path}"))?;

        let mut lines = Vec::new();
        for hunk in blame.iter() {
            let commit_sha = hunk.final_commit_id().to_string();
            let author_name = hunk
                .final_signature()
                .name()
                .unwrap_or("unknown")
                .to_string();
            let start = hunk.final_start_line() as u32;
            for offset in 0..hunk.lines_in_hunk() as u32 {
                lines.push(BlameLineInfo {
                    line: start + offset,
                    commit_sha: commit_sha.clone(),
                    author_name: author_name.clone(),
                });
            }
        }
        Ok(lines)
    }

    #[cfg(not(feature = "git-integration"))]
    pub fn blame_file(&self, _rel_path: &str) -> Result<Vec<BlameLineInfo>> {
        anyhow::bail!("git-integration feature not enabled");
    }

    /// Diff hunks between two revisions (`base..head`), or the working tree
    /// against HEAD when `head` is `"WORKTREE"`.
    #[cfg(feature = "git-integration")]
    pub fn diff(&self, base: &str, head: &str) -> Result<Vec<DiffHunkInfo>> {
        let base_commit = self.repo.revparse_single(base)?.peel_to_commit()?;
        let base_tree = base_commit.tree()?;

        let diff = if head == "WORKTREE" {
            self.repo
                .diff_tree_to_workdir_with_index(Some(&base_tree), None)?
        } else {
            let head_commit = self.repo.revparse_single(head)?.peel_to_commit()?;
            let head_tree = head_commit.tree()?;
            self.repo.diff_tree_to_tree(Some(&base_tree), Some(&head_tree), None)?
        };

        let mut hunks: std::collections::HashMap<String, DiffHunkInfo> = std::collections::HashMap::new();
        diff.foreach(
            &mut |delta, _| {
                if let Some(path) = delta.new_file().path().and_then(|p| p.to_str()) {
                    hunks.entry(path.to_string()).or_insert_with(|| DiffHunkInfo {
                        path: path.to_string(),
                        added_lines: vec![],
                        removed_lines: vec![],
                    });
                }
                true
            },
            None,
            None,
            Some(&mut |delta, _hunk, line| {
                if let Some(path) = delta.new_file().path().and_then(|p| p.to_str()) {
                    let entry = hunks.entry(path.to_string()).or_insert_with(|| DiffHunkInfo {
                        path: path.to_string(),
                        added_lines: vec![],
                        removed_lines: vec![],
                    });
                    match line.origin() {
                        '+' => entry.added_lines.push(line.new_lineno().unwrap_or(0)),
                        '-' => entry.removed_lines.push(line.old_lineno().unwrap_or(0)),
                        _ => {}
                    }
                }
                true
            }),
        )?;

        Ok(hunks.into_values().collect())
    }

    #[cfg(not(feature = "git-integration"))]
    pub fn diff(&self, _base: &str, _head: &str) -> Result<Vec<DiffHunkInfo>> {
        anyhow::bail!("git-integration feature not enabled");
    }

    /// Commit history touching `rel_path`, newest first.
    #[cfg(feature = "git-integration")]
    pub fn commits_for_path(&self, rel_path: &str, max_depth: Option<usize>) -> Result<Vec<CommitInfo>> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push_head()?;

        let mut commits = Vec::new();
        for (count, oid) in revwalk.enumerate() {
            if let Some(max) = max_depth {
                if count >= max {
                    break;
                }
            }
            let oid = oid?;
            let commit = self.repo.find_commit(oid)?;
            let tree = commit.tree()?;
            let parent_tree = commit.parent(0).ok().and_then(|p| p.tree().ok());
            let diff = self
                .repo
                .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;

            let touches_path = diff.deltas().any(|d| {
                d.new_file()
                    .path()
                    .map(|p| p.to_string_lossy() == rel_path)
                    .unwrap_or(false)
            });
            if !touches_path {
                continue;
            }

            let stats = diff.stats()?;
            let author = commit.author();
            commits.push(CommitInfo {
                sha: commit.id().to_string(),
                message: commit.message().unwrap_or("").to_string(),
                author_name: author.name().unwrap_or("unknown").to_string(),
                author_email: author.email().unwrap_or("").to_string(),
                timestamp: chrono::Utc
                    .timestamp_opt(commit.time().seconds(), 0)
                    .single()
                    .unwrap_or_else(chrono::Utc::now),
                files_changed: vec![rel_path.to_string()],
                insertions: stats.insertions(),
                deletions: stats.deletions(),
            });
        }
        Ok(commits)
    }

    #[cfg(not(feature = "git-integration"))]
    pub fn commits_for_path(&self, _rel_path: &str, _max_depth: Option<usize>) -> Result<Vec<CommitInfo>> {
        anyhow::bail!("git-integration feature not enabled");
    }
}

#[cfg(feature = "git-integration")]
use chrono::TimeZone;

#[cfg(test)]
mod tests {
    use super::*;

    fn init_repo(dir: &Path) {
        for args in [
            vec!["init", "-q"],
            vec!["config", "user.email", "t@t.com"],
            vec!["config", "user.name", "t"],
        ] {
            std::process::Command::new("git")
                .arg("-C")
                .arg(dir)
                .args(&args)
                .status()
                .unwrap();
        }
    }

    fn commit_all(dir: &Path, msg: &str) {
        std::process::Command::new("git").arg("-C").arg(dir).args(["add", "-A"]).status().unwrap();
        std::process::Command::new("git").arg("-C").arg(dir).args(["commit", "-q", "-m", msg]).status().unwrap();
    }

    #[test]
    fn metadata_reports_head_commit() {
        let tmp = tempfile::tempdir().unwrap();
        init_repo(tmp.path());
        std::fs::write(tmp.path().join("a.txt"), "hello").unwrap();
        commit_all(tmp.path(), "init");

        let repo = GitRepository::open(tmp.path(), GitOptions::default()).unwrap();
        let meta = repo.metadata().unwrap();
        assert_eq!(meta.commit_count, 1);
        assert!(!meta.head_commit.is_empty());
    }

    #[test]
    fn commits_for_path_finds_touching_commit() {
        let tmp = tempfile::tempdir().unwrap();
        init_repo(tmp.path());
        std::fs::write(tmp.path().join("a.txt"), "hello").unwrap();
        commit_all(tmp.path(), "init a");
        std::fs::write(tmp.path().join("b.txt"), "world").unwrap();
        commit_all(tmp.path(), "add b");

        let repo = GitRepository::open(tmp.path(), GitOptions::default()).unwrap();
        let commits = repo.commits_for_path("a.txt", None).unwrap();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].message, "init a");
    }
}
