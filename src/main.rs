use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tailon::cli::Cli;
use tailon::queue::{MemoryService, SharedQueueService};
use tailon::WebServer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments first to get debug flag
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let config = cli.resolve_config()?;
    tracing::debug!("Resolved configuration: {:?}", config);

    let queues: SharedQueueService = Arc::new(MemoryService::with_capacity(config.queue_capacity));
    let server = WebServer::new(&config, queues);
    server.start().await?;

    Ok(())
}
