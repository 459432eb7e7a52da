use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod output;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())
        .with_context(|| match &cli.config {
            Some(path) => format!("Failed to load configuration from {}", path.display()),
            None => "Failed to load configuration".to_string()
        })?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.logging_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let metrics = if config.observability.metrics_enabled && cli.metrics {
        Some(output::install_metrics()?)
    } else {
        None
    };

    let result = match cli.command {
        Commands::Keys(cmd) => commands::keys::run(cmd, &config, cli.json),
        Commands::Demo(args) => commands::demo::run(args, &config, cli.json).await,
        Commands::Bot(args) => commands::bot::run(args, &config, cli.json).await
    };

    if let Some(snapshotter) = metrics {
        output::print_metrics(&snapshotter, cli.json)?;
    }
    result
}
