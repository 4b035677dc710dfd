use std::sync::Arc;
use std::time::Duration;

use color_eyre::Result;
use redis::aio::ConnectionManager;
use tracing::info;

use crate::config::ServerConfig;

/// Opens a managed Redis connection shared by repositories and locks.
///
/// # Arguments
///
/// * `config` - The server configuration.
///
/// # Returns
///
/// A reconnecting connection manager, verified with a `PING`.
pub async fn initialize_redis_connection(config: &ServerConfig) -> Result<Arc<ConnectionManager>> {
    let client = redis::Client::open(config.redis_url.as_str())
        .map_err(|e| eyre::eyre!("Invalid Redis URL: {}", e))?;

    let timeout = Duration::from_millis(config.redis_connection_timeout_ms);
    let mut manager = tokio::time::timeout(timeout, ConnectionManager::new(client))
        .await
        .map_err(|_| eyre::eyre!("Timed out connecting to Redis after {:?}", timeout))?
        .map_err(|e| eyre::eyre!("Failed to connect to Redis: {}", e))?;

    redis::cmd("PING")
        .query_async::<String>(&mut manager)
        .await
        .map_err(|e| eyre::eyre!("Redis did not answer PING: {}", e))?;

    info!("redis connection established");
    Ok(Arc::new(manager))
}
