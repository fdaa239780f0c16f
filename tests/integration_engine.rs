//! End-to-end coverage over a real temp git repository and a real on-disk
//! Storage directory, wired through an `Engine` with only the git adapter
//! registered. No network, no SCIP/LSP sidecars.

use ckb::adapters::git::GitAdapter;
use ckb::config::Config;
use ckb::engine::operations::{ownership, reindex, status, symbols};
use ckb::engine::Engine;
use ckb::jobs::JobManager;
use ckb::repo_state::RepoState;
use ckb::storage::jobs::{JobStatus, JobTable};
use ckb::storage::Store;
use ckb::types::{
    Confidence, Location, RepoStateMode, StableId, Symbol, SymbolKind, Visibility,
};
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .status()
        .expect("git invocation");
    assert!(status.success(), "git {args:?} failed");
}

fn init_repo_with_one_commit(dir: &Path) {
    git(dir, &["init", "-q"]);
    git(dir, &["config", "user.email", "dev@example.com"]);
    git(dir, &["config", "user.name", "dev"]);
    std::fs::write(dir.join("lib.rs"), "fn hello() {}\n").unwrap();
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", "initial commit"]);
}

async fn build_engine(repo_root: &Path, data_dir: &Path) -> (Engine, RepoState) {
    let store = Arc::new(Store::open(data_dir).await.unwrap());
    let jobs = Arc::new(JobManager::new(Arc::new(JobTable::default()), 2));
    let adapters: Vec<Arc<dyn ckb::adapters::Adapter>> = vec![Arc::new(GitAdapter::new())];
    let config = Config { repo_path: repo_root.to_path_buf(), ..Config::default() };
    let engine = Engine::new(store, adapters, jobs, config);
    let repo_state = RepoState::compute(repo_root).unwrap();
    engine.prepare_adapters(&repo_state).await;
    (engine, repo_state)
}

fn seed_symbol(engine: &Engine, repo_state_id: ckb::types::RepoStateId) -> StableId {
    let stable_id = StableId::new("rust::lib::hello").unwrap();
    engine.store().symbols.upsert(Symbol {
        repo_state_id,
        stable_id: stable_id.clone(),
        name: "hello".to_string(),
        kind: SymbolKind::Function,
        signature: "fn hello()".to_string(),
        signature_normalized: "fn hello()".to_string(),
        module_id: "lib".to_string(),
        location: Location::point("lib.rs", 1, 0),
        container_name: None,
        documentation: None,
        modifiers: Vec::new(),
        visibility: Visibility::Public,
        visibility_confidence: Confidence::new(1.0),
    });
    stable_id
}

#[tokio::test]
async fn get_symbol_resolves_a_symbol_seeded_directly_into_storage() {
    let repo_dir = tempfile::tempdir().unwrap();
    let data_dir = tempfile::tempdir().unwrap();
    init_repo_with_one_commit(repo_dir.path());

    let (engine, repo_state) = build_engine(repo_dir.path(), data_dir.path()).await;
    let repo_state_id = repo_state.id(RepoStateMode::Head);
    let stable_id = seed_symbol(&engine, repo_state_id);

    let result = symbols::get_symbol(&engine, &repo_state, RepoStateMode::Head, &stable_id)
        .await
        .unwrap();
    assert_eq!(result.facts.symbol.name, "hello");
    assert_eq!(result.provenance.repo_state_mode, RepoStateMode::Head);
}

#[tokio::test]
async fn get_symbol_fails_not_found_for_unknown_stable_id() {
    let repo_dir = tempfile::tempdir().unwrap();
    let data_dir = tempfile::tempdir().unwrap();
    init_repo_with_one_commit(repo_dir.path());

    let (engine, repo_state) = build_engine(repo_dir.path(), data_dir.path()).await;
    let missing = StableId::new("rust::lib::nope").unwrap();

    let result = symbols::get_symbol(&engine, &repo_state, RepoStateMode::Head, &missing).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn status_report_lists_the_registered_git_backend() {
    let repo_dir = tempfile::tempdir().unwrap();
    let data_dir = tempfile::tempdir().unwrap();
    init_repo_with_one_commit(repo_dir.path());

    let (engine, repo_state) = build_engine(repo_dir.path(), data_dir.path()).await;
    let report = status::build_status(&engine, &repo_state, RepoStateMode::Head);

    assert_eq!(report.backends.len(), 1);
    assert_eq!(report.backends[0].backend_id, "git");
    assert!(!report.repo_dirty);
}

#[tokio::test]
async fn doctor_passes_the_repo_root_and_adapter_checks_on_a_healthy_repo() {
    let repo_dir = tempfile::tempdir().unwrap();
    let data_dir = tempfile::tempdir().unwrap();
    init_repo_with_one_commit(repo_dir.path());

    let (engine, repo_state) = build_engine(repo_dir.path(), data_dir.path()).await;
    let checks = status::run_doctor(&engine, &repo_state).await;

    let root_check = checks.iter().find(|c| c.name == "repo_root_readable").unwrap();
    assert_eq!(root_check.status, status::CheckStatus::Pass);
    let adapters_check = checks.iter().find(|c| c.name == "adapters_registered").unwrap();
    assert_eq!(adapters_check.status, status::CheckStatus::Pass);
}

#[tokio::test]
async fn get_ownership_returns_blame_for_a_committed_file() {
    let repo_dir = tempfile::tempdir().unwrap();
    let data_dir = tempfile::tempdir().unwrap();
    init_repo_with_one_commit(repo_dir.path());

    let (engine, repo_state) = build_engine(repo_dir.path(), data_dir.path()).await;
    let result = ownership::get_ownership(&engine, &repo_state, RepoStateMode::Head, "lib.rs", true, false)
        .await
        .unwrap();

    assert_eq!(result.facts.path, "lib.rs");
    assert!(!result.facts.blame.is_empty(), "git blame should report at least one line for a committed file");
    assert_eq!(result.facts.blame[0].author, "dev");
}

#[tokio::test]
async fn trigger_reindex_queues_a_job_that_completes_and_invalidates_the_cache() {
    let repo_dir = tempfile::tempdir().unwrap();
    let data_dir = tempfile::tempdir().unwrap();
    init_repo_with_one_commit(repo_dir.path());

    let (engine, repo_state) = build_engine(repo_dir.path(), data_dir.path()).await;
    let repo_state_id = repo_state.id(RepoStateMode::Head);
    let stable_id = seed_symbol(&engine, repo_state_id);
    symbols::get_symbol(&engine, &repo_state, RepoStateMode::Head, &stable_id).await.unwrap();
    assert!(engine.cache().len() > 0, "a successful query should populate the cache");

    let engine = Arc::new(engine);
    let job_id = reindex::trigger_reindex(&engine, repo_dir.path(), RepoStateMode::Head).unwrap();

    for _ in 0..50 {
        if matches!(engine.jobs_status(job_id).map(|j| j.status), Some(JobStatus::Completed)) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    let job = engine.jobs_status(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(engine.cache().len(), 0, "reindex should drop cache entries for this repo state");
}

#[tokio::test]
async fn repo_state_head_mode_is_stable_across_process_restarts() {
    let repo_dir = tempfile::tempdir().unwrap();
    init_repo_with_one_commit(repo_dir.path());

    let first = RepoState::compute(repo_dir.path()).unwrap().id(RepoStateMode::Head);
    let second = RepoState::compute(repo_dir.path()).unwrap().id(RepoStateMode::Head);
    assert_eq!(first, second);
}
