//! Surfaces: thin translators over the Query Engine.
//! CLI, HTTP, and MCP all bootstrap the same way and never decide WHAT the
//! answer is — only how it's transported.

pub mod cli;
pub mod http;
pub mod mcp;

use crate::adapters::Adapter;
use crate::config::Config;
use crate::engine::Engine;
use crate::error::CkbError;
use crate::jobs::JobManager;
use crate::storage::{jobs::JobTable, Store};
use std::sync::Arc;

/// Build an `Engine` from a resolved `Config`: open Storage, register every
/// enabled backend adapter, and start the Job Manager.
pub async fn bootstrap(config: Config) -> Result<Arc<Engine>, CkbError> {
    let store = Arc::new(Store::open(config.data_dir()).await?);

    let mut adapters: Vec<Arc<dyn Adapter>> = Vec::new();
    if config.backends.git {
        adapters.push(Arc::new(crate::adapters::git::GitAdapter::new()));
    }
    if config.backends.scip {
        adapters.push(Arc::new(crate::adapters::scip::ScipAdapter::new()));
    }
    if config.backends.lsp {
        adapters.push(Arc::new(crate::adapters::lsp::LspAdapter::new()));
    }
    if config.backends.tree_sitter {
        adapters.push(Arc::new(crate::adapters::tree_sitter::TreeSitterAdapter::new()));
    }
    if config.backends.telemetry {
        adapters.push(Arc::new(crate::adapters::telemetry::TelemetryAdapter::new()));
    }

    let job_table = Arc::new(JobTable::load(store.root()).await?);
    let jobs = Arc::new(JobManager::with_default_parallelism(job_table));

    Ok(Arc::new(Engine::new(store, adapters, jobs, config)))
}
