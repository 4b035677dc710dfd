//! Retry with exponential backoff for RPC calls.
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::ProviderError;
use crate::config::ServerConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Attempts after the first one
    pub max_retries: u8,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 2_000,
        }
    }
}

impl RetryConfig {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            max_retries: config.provider_max_retries,
            base_delay_ms: config.provider_retry_base_delay_ms,
            max_delay_ms: config.provider_retry_max_delay_ms,
        }
    }

    /// Delay before retry number `attempt` (1 based), doubling up to the cap.
    pub fn delay_for(&self, attempt: u8) -> Duration {
        let factor = 1u64 << u32::from(attempt.saturating_sub(1)).min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }
}

/// Runs `operation` until it succeeds, fails with a non retriable error or
/// runs out of attempts.
pub async fn retry_rpc_call<T, F, Fut>(
    operation_name: &str,
    config: &RetryConfig,
    is_retriable: fn(&ProviderError) -> bool,
    operation: F,
) -> Result<T, ProviderError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt: u8 = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if is_retriable(&e) && attempt < config.max_retries => {
                attempt += 1;
                let delay = config.delay_for(attempt);
                warn!(
                    operation = %operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying rpc call"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                debug!(operation = %operation_name, error = %e, "rpc call failed");
                return Err(e);
            }
        }
    }
}
