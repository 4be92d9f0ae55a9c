use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use mediabot::config::AppConfig;
use mediabot::services::ServiceContainer;
use mediabot::{logging, utils};
use tracing::{error, info};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, env = "MEDIABOT_CONFIG")]
    config: Option<PathBuf>,

    /// Keep every record in memory instead of the database
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before clap reads its env fallbacks
    dotenvy::dotenv().ok();
    let args = Args::parse();

    utils::http_client::install_rustls_provider();

    let config =
        AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let _log_guard =
        logging::init_logging(&config.logging).context("Failed to initialize logging")?;

    let container = ServiceContainer::new(config, args.dry_run)
        .await
        .context("Failed to initialize services")?;
    info!(version = env!("CARGO_PKG_VERSION"), "mediabot started");

    let token = container.cancellation_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C, shutting down"),
        }
        token.cancel();
    });

    let result = container.run().await;
    container.shutdown().await;
    result.context("Service host failed")?;

    Ok(())
}
