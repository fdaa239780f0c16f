//! `ckb-mcp`: standalone stdio MCP server binary, for agent clients that
//! spawn a dedicated process rather than shelling out to `ckb mcp`.

use clap::{Arg, Command};
use ckb::config::{Config, ConfigOverrides};
use ckb::observability::{init_logging_with_format, LogFormat, LogLevel};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("ckb-mcp")
        .version(env!("CARGO_PKG_VERSION"))
        .about("CKB MCP server (stdio transport)")
        .arg(Arg::new("repo").short('r').long("repo").value_name("PATH").default_value("."))
        .get_matches();

    init_logging_with_format(LogLevel::Warn, LogFormat::Pretty)?;

    let repo_path = PathBuf::from(matches.get_one::<String>("repo").unwrap());
    let overrides = ConfigOverrides { repo_path: Some(repo_path.clone()), tier: None, log_level: None };
    let config = Config::load(&repo_path, overrides)?;

    eprintln!("ckb-mcp v{} starting over stdio, repo={}", env!("CARGO_PKG_VERSION"), repo_path.display());

    let engine = ckb::surfaces::bootstrap(config).await?;
    ckb::surfaces::mcp::serve_stdio(engine).await
}
