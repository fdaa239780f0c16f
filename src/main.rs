//! `ckb`: the CLI entry point. Parses arguments and hands off to the
//! surfaces layer — no business logic lives here.

use clap::Parser;
use ckb::surfaces::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    ckb::surfaces::cli::run(cli).await
}
