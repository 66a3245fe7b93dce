//! Entry point for the `runroster` binary.

use anyhow::Result;
use clap::Parser;
use runroster_cli::cli_args::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    runroster_cli::run(cli).await.map_err(|e| anyhow::anyhow!(e))?;
    Ok(())
}
