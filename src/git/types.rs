//! Git-specific types: the facts the Git adapter (blame/diff/commits_for_path)
//! actually needs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    pub name: String,
    pub url: Option<String>,
    pub path: PathBuf,
    pub default_branch: String,
    pub commit_count: usize,
    pub head_commit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: DateTime<Utc>,
    pub files_changed: Vec<String>,
    pub insertions: usize,
    pub deletions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlameLineInfo {
    pub line: u32,
    pub commit_sha: String,
    pub author_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffHunkInfo {
    pub path: String,
    pub added_lines: Vec<u32>,
    pub removed_lines: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitOptions {
    pub exclude_patterns: Vec<String>,
    pub max_history_depth: Option<usize>,
}

impl Default for GitOptions {
    fn default() -> Self {
        Self {
            exclude_patterns: vec![
                ".git".to_string(),
                "target".to_string(),
                "node_modules".to_string(),
            ],
            max_history_depth: Some(1000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_git_options_exclude_vcs_dirs() {
        let opts = GitOptions::default();
        assert!(opts.exclude_patterns.iter().any(|p| p == ".git"));
    }
}
