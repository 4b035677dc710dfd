//! # Funding and Deployment Reconciler
//!
//! Moves Safes from a persisted intent to a confirmed deployment. Every
//! step recomputes the next action from the stored record and a fresh chain
//! query, so running a step twice, or concurrently with a restarted worker,
//! never sends a second transaction for the same transition.
//!
//! ```text
//! legacy:  NOT_FUNDED -> SAFE_FUNDED -> DEPLOYER_FUNDED_PENDING -> DEPLOYER_FUNDED
//!            -> SAFE_DEPLOY_PENDING -> DEPLOYED
//! create2: predicted -> funded -> submitted -> confirmed
//!                                   └─ replaced (same nonce, higher price)
//! ```
use alloy::primitives::Address;
use chrono::Duration;

use crate::config::ServerConfig;
use crate::constants::{
    DEFAULT_CHECK_DEPLOYER_FUNDED_DELAY_SECS, DEFAULT_CHECK_DEPLOYER_FUNDED_RETRIES,
    DEFAULT_CREATE2_REPLACE_TIMEOUT_MINUTES, DEFAULT_LEGACY_DEPLOY_TIMEOUT_MINUTES,
    DEFAULT_SAFE_FUNDING_CONFIRMATIONS, MIN_BUMP_FACTOR, TASK_LOCK_TTL_SECS,
};
use crate::models::{ReceiptSummary, SafeRelayError};
use crate::utils::{LockGuard, LockManager};

mod legacy;
pub use legacy::*;

mod create2;
pub use create2::*;

/// Tunables shared by both reconcilers.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilerSettings {
    /// Blocks a funding or deployment must be buried under.
    pub confirmations: u64,
    /// Receipt polls before a deployer funding is reconsidered.
    pub deployer_check_retries: u32,
    /// Base delay of the deployer funding re-check, in seconds.
    pub deployer_check_delay_secs: u64,
    pub legacy_deploy_timeout: Duration,
    pub create2_replace_timeout: Duration,
    pub gas_bump_factor: f64,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            confirmations: DEFAULT_SAFE_FUNDING_CONFIRMATIONS,
            deployer_check_retries: DEFAULT_CHECK_DEPLOYER_FUNDED_RETRIES,
            deployer_check_delay_secs: DEFAULT_CHECK_DEPLOYER_FUNDED_DELAY_SECS,
            legacy_deploy_timeout: Duration::minutes(DEFAULT_LEGACY_DEPLOY_TIMEOUT_MINUTES),
            create2_replace_timeout: Duration::minutes(DEFAULT_CREATE2_REPLACE_TIMEOUT_MINUTES),
            gas_bump_factor: MIN_BUMP_FACTOR,
        }
    }
}

impl From<&ServerConfig> for ReconcilerSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            confirmations: config.safe_funding_confirmations,
            deployer_check_retries: config.safe_check_deployer_funded_retries,
            deployer_check_delay_secs: config.safe_check_deployer_funded_delay,
            legacy_deploy_timeout: Duration::minutes(config.safe_deploy_timeout_minutes),
            create2_replace_timeout: Duration::minutes(
                config.safe_create2_replace_timeout_minutes,
            ),
            gas_bump_factor: config.safe_gas_bump_factor.max(MIN_BUMP_FACTOR),
        }
    }
}

/// Non-blocking lock on one reconciliation step of one Safe.
///
/// `Ok(None)` means the step is running elsewhere for this Safe.
pub async fn try_safe_step_lock(
    lock_manager: &LockManager,
    step: &str,
    safe: Address,
) -> Result<Option<LockGuard>, SafeRelayError> {
    Ok(lock_manager
        .try_lock(
            &format!("tasks:{step}:{safe}"),
            std::time::Duration::from_secs(TASK_LOCK_TTL_SECS),
        )
        .await?)
}

/// Whether a mined receipt is buried under `confirmations` blocks.
pub fn has_confirmations(receipt: &ReceiptSummary, current_block: u64, confirmations: u64) -> bool {
    receipt
        .block_number
        .is_some_and(|block| current_block.saturating_sub(block) >= confirmations)
}
