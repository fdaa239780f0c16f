//! CLI surface: one `clap`-derive subcommand per Engine
//! operation. No business logic lives here — each arm just parses
//! arguments, resolves the repo state, calls the matching Engine function,
//! and prints the `CompositeResult` as JSON.

use crate::adapters::Direction;
use crate::config::{Config, ConfigOverrides};
use crate::engine::operations::{api_diff, call_graph, dead_code, entrypoints, impact, ownership, reindex, symbols};
use crate::error::CkbError;
use crate::repo_state::RepoState;
use crate::types::{RepoStateMode, StableId};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "CKB - repository-local federated code intelligence",
    long_about = None,
    after_help = "QUICK START:
  ckb get-symbol my_crate::MyStruct
  ckb search-symbols 'Storage'
  ckb find-references my_crate::MyStruct::new
  ckb analyze-impact my_crate::MyStruct --depth 3
  ckb serve --port 4848"
)]
pub struct Cli {
    /// Enable verbose (debug) logging.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Repository root to operate on. Defaults to `CKB_REPO_PATH`, the Repo
    /// Registry's default entry, then the current directory.
    #[arg(long, global = true)]
    pub repo: Option<PathBuf>,

    /// Operate on a repository registered in the Repo Registry by name.
    #[arg(long, global = true, conflicts_with = "repo")]
    pub repo_name: Option<String>,

    /// Include uncommitted working-tree state in the repo state identity.
    #[arg(long, global = true)]
    pub full_state: bool,

    /// Print raw JSON instead of a human summary.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a symbol by stable id.
    GetSymbol { stable_id: String },
    /// Search symbols by name or pattern.
    SearchSymbols {
        query: String,
        #[arg(short, long, default_value = "25")]
        limit: usize,
    },
    /// Find every reference to a symbol.
    FindReferences {
        stable_id: String,
        #[arg(long)]
        include_tests: bool,
        #[arg(short, long, default_value = "200")]
        limit: usize,
    },
    /// Walk the call graph around a symbol.
    GetCallGraph {
        stable_id: String,
        #[arg(long, default_value = "both", value_parser = ["callers", "callees", "both"])]
        direction: String,
        #[arg(long, default_value = "1")]
        depth: u8,
    },
    /// Estimate the blast radius of changing a symbol.
    AnalyzeImpact {
        stable_id: String,
        #[arg(long, default_value = "2")]
        depth: u8,
        #[arg(long)]
        include_tests: bool,
    },
    /// Estimate the blast radius of a diff between two refs.
    AnalyzeChangeSet {
        base: String,
        head: String,
        #[arg(long, default_value = "2")]
        depth: u8,
        #[arg(long)]
        include_tests: bool,
        #[arg(long)]
        strict: bool,
    },
    /// Summarize a PR's diff: file stats, risk, suggested reviewers.
    SummarizePr {
        base: String,
        head: String,
        #[arg(long)]
        include_ownership: bool,
    },
    /// List detected entrypoints, ranked by fan-out.
    ListEntrypoints {
        #[arg(long)]
        module: Option<String>,
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
    /// Trace how a symbol is reached from a detected entrypoint.
    TraceUsage {
        stable_id: String,
        #[arg(long, default_value = "5")]
        max_paths: usize,
        #[arg(long, default_value = "5")]
        max_depth: u8,
    },
    /// Find symbols with no (or only self/test) references.
    FindDeadCode {
        #[arg(long)]
        include_unexported: bool,
        #[arg(long, default_value = "0.5")]
        min_confidence: f32,
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,
        #[arg(long)]
        exclude_test_only: bool,
        #[arg(short, long, default_value = "100")]
        limit: usize,
    },
    /// Explain whether a symbol looks safe to remove.
    JustifySymbol { stable_id: String },
    /// Compare the public API surface against a base snapshot.
    CompareApi {
        /// Path to a JSON array of `Symbol` captured at the base ref.
        base_snapshot: PathBuf,
        #[arg(long)]
        include_minor: bool,
        #[arg(long)]
        ignore_private: bool,
    },
    /// Show who owns a file: blame + commit history authorship.
    GetOwnership {
        path: String,
        #[arg(long)]
        include_blame: bool,
        #[arg(long)]
        include_history: bool,
    },
    /// Flag files where CODEOWNERS has drifted from actual authorship.
    GetOwnershipDrift {
        #[arg(long)]
        scope: Option<String>,
        #[arg(long, default_value = "0.5")]
        threshold: f32,
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
    /// Report backend availability, index freshness, and cache occupancy.
    Status,
    /// Run environment/adapter health checks.
    Doctor,
    /// List background jobs.
    Jobs {
        #[arg(long)]
        kind: Option<String>,
    },
    /// Queue a reindex job: re-run adapter preparation and drop cached
    /// results for the repository's current state.
    Reindex,
    /// Start the HTTP JSON surface.
    Serve {
        #[arg(short, long, default_value = "4848")]
        port: u16,
    },
    /// Start the stdio MCP surface.
    Mcp,
    /// Register the resolved repository path under `name` in the Repo
    /// Registry and make it the default for future invocations without
    /// `--repo`/`--repo-name`.
    Use { name: String },
}

fn direction_from_str(s: &str) -> Direction {
    match s {
        "callers" => Direction::Callers,
        "callees" => Direction::Callees,
        _ => Direction::Both,
    }
}

/// Both modes print JSON for now; `--json` exists so agent callers can rely
/// on it staying machine-readable once a human-summary mode is added.
fn print_result<T: serde::Serialize>(result: &T, _json: bool) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}

fn stable_id(s: &str) -> Result<StableId, CkbError> {
    StableId::new(s).map_err(CkbError::from)
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    crate::observability::init_logging_with_format(
        crate::observability::LogLevel::parse(level),
        crate::observability::LogFormat::Pretty,
    )?;

    if let Commands::Use { name } = &cli.command {
        let path = crate::config::resolve_repo_path(cli.repo.as_deref(), None)?;
        let path = std::fs::canonicalize(&path).unwrap_or(path);
        if !path.is_dir() {
            anyhow::bail!("'{}' is not a directory", path.display());
        }
        let mut registry = crate::registry::Registry::open_default()?;
        registry.add(name.as_str(), path.clone())?;
        registry.set_default(name.as_str())?;
        println!("registered '{name}' -> {} and set as default", path.display());
        return Ok(());
    }

    let repo_path = crate::config::resolve_repo_path(cli.repo.as_deref(), cli.repo_name.as_deref())?;
    if !repo_path.is_dir() {
        anyhow::bail!("'{}' is not a directory", repo_path.display());
    }
    if let Some(name) = &cli.repo_name {
        if let Ok(mut registry) = crate::registry::Registry::open_default() {
            let _ = registry.touch(name);
        }
    }

    let overrides = ConfigOverrides { repo_path: Some(repo_path.clone()), tier: None, log_level: None };
    let config = Config::load(&repo_path, overrides)?;
    let mode = if cli.full_state { RepoStateMode::Full } else { RepoStateMode::Head };

    match cli.command {
        Commands::Serve { port } => {
            let mut config = config;
            config.daemon.port = port;
            let engine = super::bootstrap(config).await?;
            super::http::serve(engine).await?;
            return Ok(());
        }
        Commands::Mcp => {
            let engine = super::bootstrap(config).await?;
            super::mcp::serve_stdio(engine).await?;
            return Ok(());
        }
        _ => {}
    }

    let engine = super::bootstrap(config).await?;
    let repo_state = RepoState::compute(&repo_path)?;
    engine.prepare_adapters(&repo_state).await;

    match cli.command {
        Commands::GetSymbol { stable_id: id } => {
            let result = symbols::get_symbol(&engine, &repo_state, mode, &stable_id(&id)?).await?;
            print_result(&result, cli.json)?;
        }
        Commands::SearchSymbols { query, limit } => {
            let result = symbols::search_symbols(&engine, &repo_state, mode, &query, limit).await?;
            print_result(&result, cli.json)?;
        }
        Commands::FindReferences { stable_id: id, include_tests, limit } => {
            let result = symbols::find_references(&engine, &repo_state, mode, &stable_id(&id)?, include_tests, limit).await?;
            print_result(&result, cli.json)?;
        }
        Commands::GetCallGraph { stable_id: id, direction, depth } => {
            let result = call_graph::get_call_graph(&engine, &repo_state, mode, &stable_id(&id)?, direction_from_str(&direction), depth).await?;
            print_result(&result, cli.json)?;
        }
        Commands::AnalyzeImpact { stable_id: id, depth, include_tests } => {
            let result = impact::analyze_impact(&engine, &repo_state, mode, &stable_id(&id)?, depth, include_tests).await?;
            print_result(&result, cli.json)?;
        }
        Commands::AnalyzeChangeSet { base, head, depth, include_tests, strict } => {
            let result = impact::analyze_change_set(&engine, &repo_state, mode, &base, &head, depth, include_tests, strict).await?;
            print_result(&result, cli.json)?;
        }
        Commands::SummarizePr { base, head, include_ownership } => {
            let result = impact::summarize_pr(&engine, &repo_state, mode, &base, &head, include_ownership).await?;
            print_result(&result, cli.json)?;
        }
        Commands::ListEntrypoints { module, limit } => {
            let result = entrypoints::list_entrypoints(&engine, &repo_state, mode, module.as_deref(), limit).await?;
            print_result(&result, cli.json)?;
        }
        Commands::TraceUsage { stable_id: id, max_paths, max_depth } => {
            let result = call_graph::trace_usage(&engine, &repo_state, mode, &stable_id(&id)?, max_paths, max_depth).await?;
            print_result(&result, cli.json)?;
        }
        Commands::FindDeadCode { include_unexported, min_confidence, exclude, exclude_test_only, limit } => {
            let result = dead_code::find_dead_code(&engine, &repo_state, mode, include_unexported, min_confidence, &exclude, exclude_test_only, limit).await?;
            print_result(&result, cli.json)?;
        }
        Commands::JustifySymbol { stable_id: id } => {
            let result = dead_code::justify_symbol(&engine, &repo_state, mode, &stable_id(&id)?).await?;
            print_result(&result, cli.json)?;
        }
        Commands::CompareApi { base_snapshot, include_minor, ignore_private } => {
            let contents = std::fs::read_to_string(&base_snapshot)?;
            let base_symbols: Vec<crate::types::Symbol> = serde_json::from_str(&contents)?;
            let result = api_diff::compare_api(&engine, &repo_state, mode, &base_symbols, include_minor, ignore_private).await?;
            print_result(&result, cli.json)?;
        }
        Commands::GetOwnership { path, include_blame, include_history } => {
            let result = ownership::get_ownership(&engine, &repo_state, mode, &path, include_blame, include_history).await?;
            print_result(&result, cli.json)?;
        }
        Commands::GetOwnershipDrift { scope, threshold, limit } => {
            let result = ownership::get_ownership_drift(&engine, &repo_state, mode, scope.as_deref(), threshold, limit).await?;
            print_result(&result, cli.json)?;
        }
        Commands::Status => {
            let status = engine.get_status(&repo_state, mode);
            print_result(&status, cli.json)?;
        }
        Commands::Doctor => {
            let checks = engine.doctor(&repo_state).await;
            print_result(&checks, cli.json)?;
        }
        Commands::Jobs { kind } => {
            let jobs = engine.jobs_list(None, kind.as_deref());
            print_result(&jobs, cli.json)?;
        }
        Commands::Reindex => {
            let id = reindex::trigger_reindex(&engine, &repo_path, mode)?;
            println!("queued reindex job {id}");
        }
        Commands::Serve { .. } | Commands::Mcp | Commands::Use { .. } => unreachable!("handled above"),
    }

    Ok(())
}

