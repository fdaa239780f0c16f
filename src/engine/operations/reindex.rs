//! `trigger_reindex`: re-run adapter preparation against the repository's
//! current state and drop any cached results tied to the state it replaces.

use crate::engine::Engine;
use crate::error::CkbError;
use crate::jobs::CancellationToken;
use crate::repo_state::RepoState;
use crate::types::RepoStateMode;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Submit a reindex job for `repo_root` and return its job id immediately.
/// Fails fast with `CkbError::Busy` if the job queue is already at capacity
/// rather than queuing indefinitely.
pub fn trigger_reindex(engine: &Arc<Engine>, repo_root: &Path, mode: RepoStateMode) -> Result<Uuid, CkbError> {
    let repo_state = RepoState::compute(repo_root)?;
    let stale_repo_state_id = repo_state.id(mode);
    let repo_root = repo_root.to_path_buf();
    let jobs = engine.jobs.clone();
    let engine = engine.clone();

    jobs.spawn("reindex", format!("reindex {}", repo_root.display()), move |token: CancellationToken| async move {
        run_reindex(engine, repo_root, stale_repo_state_id, mode, token).await
    })
}

async fn run_reindex(
    engine: Arc<Engine>,
    repo_root: std::path::PathBuf,
    stale_repo_state_id: crate::types::RepoStateId,
    mode: RepoStateMode,
    token: CancellationToken,
) -> Result<String, CkbError> {
    if token.is_cancelled() {
        return Err(CkbError::Cancelled("reindex cancelled before starting".into()));
    }

    let repo_state = RepoState::compute(&repo_root)?;
    engine.prepare_adapters(&repo_state).await;

    if token.is_cancelled() {
        return Err(CkbError::Cancelled("reindex cancelled after preparing adapters".into()));
    }

    let fresh_repo_state_id = repo_state.id(mode);
    engine.cache().invalidate_repo_state(stale_repo_state_id);
    if fresh_repo_state_id != stale_repo_state_id {
        engine.cache().invalidate_repo_state(fresh_repo_state_id);
    }

    Ok(format!("reindexed {}", repo_root.display()))
}
