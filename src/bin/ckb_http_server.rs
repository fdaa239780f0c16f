//! `ckb-http`: standalone HTTP JSON server binary, for deployments that
//! run the query surface as its own long-lived process.

use clap::{Arg, Command};
use ckb::config::{Config, ConfigOverrides};
use ckb::observability::{init_logging_with_format, LogFormat, LogLevel};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("ckb-http")
        .version(env!("CARGO_PKG_VERSION"))
        .about("CKB HTTP query surface")
        .arg(Arg::new("repo").short('r').long("repo").value_name("PATH").default_value("."))
        .arg(Arg::new("port").short('p').long("port").value_name("PORT"))
        .get_matches();

    init_logging_with_format(LogLevel::Info, LogFormat::Pretty)?;

    let repo_path = PathBuf::from(matches.get_one::<String>("repo").unwrap());
    let overrides = ConfigOverrides { repo_path: Some(repo_path.clone()), tier: None, log_level: None };
    let mut config = Config::load(&repo_path, overrides)?;
    if let Some(port) = matches.get_one::<String>("port") {
        config.daemon.port = port.parse()?;
    }

    let engine = ckb::surfaces::bootstrap(config).await?;
    ckb::surfaces::http::serve(engine).await
}
