//! Tree-sitter adapter: `complexity` and `entrypoint_hints`.
//!
//! Unlike the git adapter, this one needs a whole-repo view up front since
//! entrypoint hints are not scoped to a single file, so `prepare()` walks the
//! tree once and caches a parse per source file.

use super::{
    Adapter, Capability, ComplexityReport, EntrypointHint, FactQuery, PartialAnswer,
    ProvenanceFragment,
};
use crate::error::CkbError;
use crate::parsing::CodeParser;
use crate::repo_state::RepoState;
use crate::types::{Confidence, StableId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

const EXCLUDED_DIRS: &[&str] = &[".git", "target", "node_modules", ".ckb"];
const MAX_FILES: usize = 20_000;

struct IndexedFile {
    path: String,
    cyclomatic: u32,
    line_count: u32,
    symbol_names: Vec<(String, bool)>,
}

pub struct TreeSitterAdapter {
    files: RwLock<Vec<IndexedFile>>,
}

impl TreeSitterAdapter {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(Vec::new()),
        }
    }
}

impl Default for TreeSitterAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn walk_dir(root: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        if out.len() >= MAX_FILES {
            return;
        }
        let path = entry.path();
        if path.is_dir() {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if EXCLUDED_DIRS.contains(&name) {
                continue;
            }
            walk_dir(&path, out);
        } else {
            out.push(path);
        }
    }
}

#[async_trait]
impl Adapter for TreeSitterAdapter {
    fn backend_id(&self) -> &str {
        "tree_sitter"
    }

    fn describe(&self) -> Vec<Capability> {
        vec![Capability::Complexity, Capability::EntrypointHints]
    }

    async fn prepare(&self, repo_state: &RepoState) -> Result<(), CkbError> {
        let root = repo_state.root().to_path_buf();
        let mut candidates = Vec::new();
        walk_dir(&root, &mut candidates);

        let mut indexed = Vec::new();
        for path in candidates {
            let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if crate::parsing::SupportedLanguage::from_extension(extension).is_none() {
                continue;
            }
            let Ok(source) = std::fs::read_to_string(&path) else {
                continue;
            };
            let Some(parsed) = CodeParser::parse_file(&path, &source) else {
                continue;
            };
            let rel_path = path
                .strip_prefix(&root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            indexed.push(IndexedFile {
                path: rel_path,
                cyclomatic: parsed.cyclomatic,
                line_count: parsed.line_count,
                symbol_names: parsed
                    .symbols
                    .into_iter()
                    .map(|s| (s.name, s.is_public))
                    .collect(),
            });
        }
        *self.files.write() = indexed;
        Ok(())
    }

    async fn answer(
        &self,
        query: &FactQuery,
        deadline: Instant,
    ) -> Result<(PartialAnswer, ProvenanceFragment), CkbError> {
        if super::past_deadline(deadline) {
            return Err(CkbError::Timeout("tree_sitter adapter: deadline already passed".into()));
        }
        let start = Instant::now();
        let files = self.files.read();

        let mut answer = PartialAnswer {
            confidence: Confidence::new(0.8),
            ..Default::default()
        };
        let (capability, data_source) = match query {
            FactQuery::Complexity { file_id, path } => {
                let report = files
                    .iter()
                    .find(|f| &f.path == path)
                    .map(|f| ComplexityReport {
                        file_id: file_id.clone(),
                        cyclomatic: f.cyclomatic,
                        line_count: f.line_count,
                    })
                    .ok_or_else(|| CkbError::NotFound(format!("no parse available for {path}")))?;
                answer.complexity = vec![report];
                (Capability::Complexity, path.clone())
            }
            FactQuery::EntrypointHints => {
                let mut hints_by_name: HashMap<String, usize> = HashMap::new();
                for file in files.iter() {
                    for (name, is_public) in &file.symbol_names {
                        if !is_public && name != "main" {
                            continue;
                        }
                        if CodeParser::entrypoint_basis(name).is_some() {
                            *hints_by_name.entry(name.clone()).or_default() += 1;
                        }
                    }
                }
                answer.entrypoints = hints_by_name
                    .into_iter()
                    .filter_map(|(name, fan_out)| {
                        CodeParser::entrypoint_basis(&name).map(|basis| EntrypointHint {
                            stable_id: StableId::new(name).ok()?,
                            basis: basis.to_string(),
                            fan_out,
                        })
                    })
                    .collect();
                (Capability::EntrypointHints, "repository-wide scan".to_string())
            }
            other => {
                return Err(CkbError::InvalidArgument(format!(
                    "tree_sitter adapter cannot answer {other:?}"
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
            FactQuery::EntrypointHints => 300,
            FactQuery::Complexity { .. } => 40,
            _ => 40,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_dir_skips_excluded_directories() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("target")).unwrap();
        std::fs::write(tmp.path().join("target/generated.rs"), "fn x() {}").unwrap();
        std::fs::write(tmp.path().join("lib.rs"), "fn x() {}").unwrap();

        let mut found = Vec::new();
        walk_dir(tmp.path(), &mut found);
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("lib.rs"));
    }
}
