//! docenrich CLI: webhook-driven entity enrichment for document batches.
//!
//! Serves the enrichment webhook, or runs a single batch in the foreground.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
