//! `get_ownership`, `get_ownership_drift`.

use crate::adapters::{Capability, FactQuery};
use crate::engine::provenance::{CompositeResult, Drilldown};
use crate::engine::{Engine, DEFAULT_QUERY_BUDGET};
use crate::error::CkbError;
use crate::adapters::BlameLine;
use crate::repo_state::RepoState;
use crate::types::{CommitTouch, RepoStateMode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub author: String,
    pub touches: usize,
    pub lines_owned: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetOwnershipFacts {
    pub path: String,
    pub owners: Vec<Owner>,
    pub blame: Vec<BlameLine>,
    pub history: Vec<CommitTouch>,
}

/// `get_ownership(path, include_blame, include_history)`.
pub async fn get_ownership(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    path: &str,
    include_blame: bool,
    include_history: bool,
) -> Result<CompositeResult<GetOwnershipFacts>, CkbError> {
    let repo_state_id = repo_state.id(mode);
    let args = (path, include_blame, include_history);
    engine
        .run_cached("get_ownership", &args, repo_state_id, || {
            get_ownership_inner(engine, repo_state, mode, path, include_blame, include_history)
        })
        .await
}

async fn get_ownership_inner(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    path: &str,
    include_blame: bool,
    include_history: bool,
) -> Result<CompositeResult<GetOwnershipFacts>, CkbError> {
    let repo_state_id = repo_state.id(mode);
    let mut provenance = engine.new_provenance_builder(repo_state, mode);
    let file_id = crate::types::file_id_for_path(path);

    let blame_answers = engine
        .fan_out(
            Capability::Blame,
            FactQuery::Blame { file_id: file_id.clone(), path: path.to_string() },
            DEFAULT_QUERY_BUDGET,
            &mut provenance,
        )
        .await?;
    let blame: Vec<BlameLine> = blame_answers.into_iter().flat_map(|a| a.answer.blame).collect();

    let history = engine.facts().commits_for_path(repo_state_id, &file_id);

    let mut touches_by_author: HashMap<String, usize> = HashMap::new();
    for touch in &history {
        *touches_by_author.entry(touch.author.clone()).or_insert(0) += 1;
    }
    let mut lines_by_author: HashMap<String, u32> = HashMap::new();
    for line in &blame {
        *lines_by_author.entry(line.author.clone()).or_insert(0) += 1;
    }

    let mut authors: Vec<String> = touches_by_author.keys().chain(lines_by_author.keys()).cloned().collect();
    authors.sort();
    authors.dedup();

    let mut owners: Vec<Owner> = authors
        .into_iter()
        .map(|author| Owner {
            touches: touches_by_author.get(&author).copied().unwrap_or(0),
            lines_owned: lines_by_author.get(&author).copied().unwrap_or(0),
            author,
        })
        .collect();
    owners.sort_by(|a, b| b.lines_owned.cmp(&a.lines_owned).then(b.touches.cmp(&a.touches)).then(a.author.cmp(&b.author)));

    let facts = GetOwnershipFacts {
        path: path.to_string(),
        owners,
        blame: if include_blame { blame } else { Vec::new() },
        history: if include_history { history } else { Vec::new() },
    };

    let sealed = provenance.seal();
    Ok(CompositeResult::new(
        facts,
        vec![Drilldown { label: "ownership drift".to_string(), query: format!("get_ownership_drift(scope=\"{path}\")") }],
        sealed,
    ))
}

/// Owner most responsible for a file per CODEOWNERS, by longest matching
/// pattern (last match wins on ties, mirroring GitHub's own precedence).
fn codeowners_match<'a>(rules: &'a [(String, Vec<String>)], path: &str) -> Option<&'a [String]> {
    let mut best: Option<&(String, Vec<String>)> = None;
    for rule in rules {
        if pattern_matches(&rule.0, path) {
            best = Some(rule);
        }
    }
    best.map(|(_, owners)| owners.as_slice())
}

/// Minimal CODEOWNERS glob: `*` matches any run of non-`/` characters,
/// a trailing `/` matches the directory and everything beneath it.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    let pattern = pattern.trim_start_matches('/');
    if let Some(dir) = pattern.strip_suffix('/') {
        return path == dir || path.starts_with(&format!("{dir}/"));
    }
    if !pattern.contains('*') {
        return path == pattern || path.ends_with(&format!("/{pattern}"));
    }
    let escaped = regex::escape(pattern).replace("\\*", "[^/]*");
    regex::Regex::new(&format!("^{escaped}$")).map(|re| re.is_match(path)).unwrap_or(false)
}

fn parse_codeowners(contents: &str) -> Vec<(String, Vec<String>)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let pattern = parts.next()?.to_string();
            let owners: Vec<String> = parts.map(|o| o.trim_start_matches('@').to_string()).collect();
            Some((pattern, owners))
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipDrift {
    pub path: String,
    pub declared_owners: Vec<String>,
    pub actual_top_author: Option<String>,
    pub actual_share: f32,
    pub drift: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetOwnershipDriftFacts {
    pub drifted: Vec<OwnershipDrift>,
}

/// `get_ownership_drift(scope?, threshold, limit)`: files where the
/// CODEOWNERS-declared owner no longer matches the dominant blame author by
/// more than `threshold`.
pub async fn get_ownership_drift(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    scope: Option<&str>,
    threshold: f32,
    limit: usize,
) -> Result<CompositeResult<GetOwnershipDriftFacts>, CkbError> {
    let repo_state_id = repo_state.id(mode);
    let args = (scope, threshold, limit);
    engine
        .run_cached("get_ownership_drift", &args, repo_state_id, || {
            get_ownership_drift_inner(engine, repo_state, mode, scope, threshold, limit)
        })
        .await
}

async fn get_ownership_drift_inner(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    scope: Option<&str>,
    threshold: f32,
    limit: usize,
) -> Result<CompositeResult<GetOwnershipDriftFacts>, CkbError> {
    let limit = crate::validation::validate_limit("get_ownership_drift", limit, 1000)?;
    let repo_state_id = repo_state.id(mode);
    let mut provenance = engine.new_provenance_builder(repo_state, mode);

    let codeowners_path = ["CODEOWNERS", ".github/CODEOWNERS", "docs/CODEOWNERS"]
        .iter()
        .map(|p| repo_state.root().join(p))
        .find(|p| p.exists());
    let rules = match &codeowners_path {
        Some(p) => parse_codeowners(&std::fs::read_to_string(p).map_err(|e| CkbError::Internal(format!("reading CODEOWNERS: {e}")))?),
        None => {
            provenance.record_success("codeowners", vec![], 0, false);
            let sealed = provenance.seal();
            return Ok(CompositeResult::new(GetOwnershipDriftFacts { drifted: Vec::new() }, Vec::new(), sealed));
        }
    };

    let files = engine.facts().store().files.all_for_repo_state(repo_state_id);
    let mut drifted = Vec::new();
    for file in &files {
        if let Some(scope) = scope {
            if !file.path.starts_with(scope) {
                continue;
            }
        }
        let Some(owners) = codeowners_match(&rules, &file.path) else { continue };
        if owners.is_empty() {
            continue;
        }
        let history = engine.facts().commits_for_path(repo_state_id, &file.id);
        if history.is_empty() {
            continue;
        }
        let mut touches: HashMap<String, usize> = HashMap::new();
        for touch in &history {
            *touches.entry(touch.author.clone()).or_insert(0) += 1;
        }
        let total: usize = touches.values().sum();
        let Some((top_author, top_count)) = touches.iter().max_by_key(|(_, count)| **count) else { continue };
        let share = *top_count as f32 / total as f32;
        let declared_match = owners.iter().any(|o| top_author.contains(o.as_str()));
        let drift = if declared_match { 0.0 } else { share };
        if drift > threshold {
            drifted.push(OwnershipDrift {
                path: file.path.clone(),
                declared_owners: owners.to_vec(),
                actual_top_author: Some(top_author.clone()),
                actual_share: share,
                drift,
            });
        }
    }
    drifted.sort_by(|a, b| b.drift.partial_cmp(&a.drift).unwrap_or(std::cmp::Ordering::Equal).then(a.path.cmp(&b.path)));
    let before = drifted.len();
    drifted.truncate(limit);
    provenance.record_truncation("drifted", before.saturating_sub(drifted.len()), "dropped lowest-drift files beyond limit");

    let sealed = provenance.seal();
    Ok(CompositeResult::new(GetOwnershipDriftFacts { drifted }, Vec::new(), sealed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_path_pattern_matches_only_that_file() {
        assert!(pattern_matches("src/main.rs", "src/main.rs"));
        assert!(!pattern_matches("src/main.rs", "src/lib.rs"));
    }

    #[test]
    fn trailing_slash_matches_directory_tree() {
        assert!(pattern_matches("docs/", "docs/guide.md"));
        assert!(pattern_matches("docs/", "docs/api/index.md"));
        assert!(!pattern_matches("docs/", "other/docs.md"));
    }

    #[test]
    fn star_matches_within_one_path_segment() {
        assert!(pattern_matches("src/*.rs", "src/lib.rs"));
        assert!(!pattern_matches("src/*.rs", "src/nested/lib.rs"));
    }

    #[test]
    fn last_matching_rule_wins() {
        let rules = parse_codeowners("* @team-default\nsrc/auth/ @team-security\n");
        assert_eq!(codeowners_match(&rules, "src/auth/login.rs"), Some(&["team-security".to_string()][..]));
        assert_eq!(codeowners_match(&rules, "README.md"), Some(&["team-default".to_string()][..]));
    }

    #[test]
    fn parse_codeowners_skips_comments_and_blank_lines() {
        let rules = parse_codeowners("# comment\n\nsrc/ @alice @bob\n");
        assert_eq!(rules, vec![("src/".to_string(), vec!["alice".to_string(), "bob".to_string()])]);
    }
}
