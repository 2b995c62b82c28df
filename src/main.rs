use clap::Parser;
use tracing_subscriber::EnvFilter;

use dashbeam_events::cli::{Cli, Commands};
use dashbeam_events::{EventBus, EventsConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Routing is pure; no broker needed
    if let Commands::Route { event_type } = &cli.command {
        dashbeam_events::cli::route::execute(event_type);
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => EventsConfig::load(path)?,
        None => EventsConfig::default(),
    };
    let bus = EventBus::connect(&config).await?;

    let result = match &cli.command {
        Commands::Replay { topic } => dashbeam_events::cli::replay::execute(topic, &bus).await,
        Commands::DeadLetters { topic } => {
            dashbeam_events::cli::dead_letters::execute(topic, &bus).await
        }
        Commands::History { id } => dashbeam_events::cli::history::execute(id, &bus).await,
        Commands::Route { .. } => Ok(()),
    };

    bus.close().await?;
    result?;
    Ok(())
}
