use color_eyre::Result;
use dotenvy::dotenv;
use futures::future::join_all;
use tokio::sync::watch;
use tracing::{info, warn};

use safe_relay_service::{
    bootstrap::{initialize_app_state, initialize_workers},
    config::ServerConfig,
    logging::setup_logging,
};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    // Load environment variables from .env file
    dotenv().ok();
    setup_logging()?;

    let config = ServerConfig::from_env()?;
    info!(storage = %config.repository_storage_type, "starting safe relay");

    let (app_state, receiver) = initialize_app_state(&config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = initialize_workers(app_state, receiver, shutdown_rx)?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, stopping workers");
    if shutdown_tx.send(true).is_err() {
        warn!("all workers already stopped");
    }
    for result in join_all(handles).await {
        if let Err(e) = result {
            warn!(error = %e, "worker task ended abnormally");
        }
    }

    info!("safe relay stopped");
    Ok(())
}
