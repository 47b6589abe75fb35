mod cli;
mod commands;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use orchestrator_engine::{Orchestrator, OrchestratorConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::initialize(cli.verbose, cli.log_file.as_deref());

    let mut config = OrchestratorConfig::load(&cli.config)?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    let orchestrator =
        Orchestrator::new(config.settings()).context("failed to set up the orchestrator")?;

    match cli.command {
        Commands::Health => commands::health(&orchestrator).await,
        Commands::Run {
            types,
            timeout_ms,
            export,
        } => commands::run(&orchestrator, &types, timeout_ms, export.as_deref()).await,
        Commands::Comprehensive {
            types,
            timeout_ms,
            export,
        } => commands::comprehensive(&orchestrator, &types, timeout_ms, export.as_deref()).await,
        Commands::Stream { kind, params } => commands::stream(&orchestrator, &kind, &params).await,
    }
}
