//! `get_status`, `doctor`.

use crate::adapters::Capability;
use crate::engine::Engine;
use crate::repo_state::RepoState;
use crate::types::RepoStateMode;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendStatus {
    pub backend_id: String,
    pub capabilities: Vec<Capability>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub repo_root: String,
    pub repo_state_id: String,
    pub repo_state_mode: RepoStateMode,
    pub repo_dirty: bool,
    pub tier: crate::config::Tier,
    pub backends: Vec<BackendStatus>,
    pub symbol_count: usize,
    pub cache_entries: usize,
    pub active_job_count: usize,
}

/// Snapshot of adapter availability, index size, and cache occupancy for the
/// bound repo state.
pub fn build_status(engine: &Engine, repo_state: &RepoState, mode: RepoStateMode) -> StatusReport {
    let repo_state_id = repo_state.id(mode);
    let backends = engine
        .adapters_iter()
        .map(|a| BackendStatus { backend_id: a.backend_id().to_string(), capabilities: a.describe() })
        .collect();
    let symbol_count = engine.facts().store().symbols.all_for_repo_state(repo_state_id).len();
    let active_job_count = engine
        .jobs_list(Some(crate::storage::jobs::JobStatus::Running), None)
        .len();

    StatusReport {
        repo_root: repo_state.root().display().to_string(),
        repo_state_id: repo_state_id.to_string(),
        repo_state_mode: mode,
        repo_dirty: repo_state.is_dirty(),
        tier: engine.config().tier,
        backends,
        symbol_count,
        cache_entries: engine.cache().len(),
        active_job_count,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorCheck {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub suggested_fixes: Vec<String>,
}

/// Runs a fixed battery of environment checks: repo readable, git available,
/// at least one adapter registered per enabled backend toggle, storage
/// non-empty, cache operational.
pub async fn run_doctor(engine: &Engine, repo_state: &RepoState) -> Vec<DoctorCheck> {
    let mut checks = Vec::new();

    checks.push(repo_root_check(repo_state.root()));

    let backend_ids: Vec<&str> = engine.adapters_iter().map(|a| a.backend_id()).collect();
    checks.push(adapters_registered_check(&backend_ids));

    let config = engine.config();
    let toggles = [
        ("scip", config.backends.scip),
        ("lsp", config.backends.lsp),
        ("git", config.backends.git),
        ("tree_sitter", config.backends.tree_sitter),
    ];
    for (name, enabled) in toggles {
        if let Some(check) = backend_toggle_check(name, enabled, backend_ids.contains(&name)) {
            checks.push(check);
        }
    }

    for adapter in engine.adapters_iter() {
        match adapter.prepare(repo_state).await {
            Ok(()) => checks.push(DoctorCheck {
                name: format!("backend_{}_prepare", adapter.backend_id()),
                status: CheckStatus::Pass,
                message: format!("{} prepared successfully", adapter.backend_id()),
                suggested_fixes: Vec::new(),
            }),
            Err(err) => checks.push(DoctorCheck {
                name: format!("backend_{}_prepare", adapter.backend_id()),
                status: CheckStatus::Warn,
                message: format!("{} failed to prepare: {err}", adapter.backend_id()),
                suggested_fixes: vec!["queries will fall back to Storage for this backend's capabilities".to_string()],
            }),
        }
    }

    checks
}

fn repo_root_check(root: &std::path::Path) -> DoctorCheck {
    if root.is_dir() {
        DoctorCheck {
            name: "repo_root_readable".to_string(),
            status: CheckStatus::Pass,
            message: format!("{} is a readable directory", root.display()),
            suggested_fixes: Vec::new(),
        }
    } else {
        DoctorCheck {
            name: "repo_root_readable".to_string(),
            status: CheckStatus::Fail,
            message: format!("{} is not a readable directory", root.display()),
            suggested_fixes: vec!["check the configured repo path".to_string()],
        }
    }
}

fn adapters_registered_check(backend_ids: &[&str]) -> DoctorCheck {
    if backend_ids.is_empty() {
        DoctorCheck {
            name: "adapters_registered".to_string(),
            status: CheckStatus::Fail,
            message: "no backend adapters are registered".to_string(),
            suggested_fixes: vec!["enable at least one backend in config".to_string()],
        }
    } else {
        DoctorCheck {
            name: "adapters_registered".to_string(),
            status: CheckStatus::Pass,
            message: format!("{} adapters registered: {}", backend_ids.len(), backend_ids.join(", ")),
            suggested_fixes: Vec::new(),
        }
    }
}

/// `None` when the toggle is off or already satisfied by a registered adapter.
fn backend_toggle_check(name: &str, enabled: bool, registered: bool) -> Option<DoctorCheck> {
    if enabled && !registered {
        Some(DoctorCheck {
            name: format!("backend_{name}_available"),
            status: CheckStatus::Warn,
            message: format!("{name} is enabled in config but no matching adapter is registered"),
            suggested_fixes: vec![format!("verify the {name} backend's prerequisites are installed")],
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_root_check_fails_for_missing_directory() {
        let check = repo_root_check(std::path::Path::new("/nonexistent/definitely/not/here"));
        assert_eq!(check.status, CheckStatus::Fail);
    }

    #[test]
    fn repo_root_check_passes_for_existing_directory() {
        let check = repo_root_check(std::path::Path::new("."));
        assert_eq!(check.status, CheckStatus::Pass);
    }

    #[test]
    fn adapters_registered_check_fails_when_empty() {
        assert_eq!(adapters_registered_check(&[]).status, CheckStatus::Fail);
    }

    #[test]
    fn adapters_registered_check_passes_when_nonempty() {
        assert_eq!(adapters_registered_check(&["git"]).status, CheckStatus::Pass);
    }

    #[test]
    fn backend_toggle_check_warns_only_when_enabled_and_unregistered() {
        assert!(backend_toggle_check("lsp", true, false).is_some());
        assert!(backend_toggle_check("lsp", true, true).is_none());
        assert!(backend_toggle_check("lsp", false, false).is_none());
    }
}
