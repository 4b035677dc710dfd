use alloy::primitives::{address, Address};

/// Signature width of every packed Safe signature, `r(32) ‖ s(32) ‖ v(1)`.
pub const SIGNATURE_LENGTH: usize = 65;

/// Highest address value; rejected as a legacy deployer.
pub const MAX_ADDRESS: Address = address!("0xffffffffffffffffffffffffffffffffffffffff");

/// Outer attempts of the legacy deployer signature search.
pub const LEGACY_DEPLOYER_MAX_ATTEMPTS: usize = 100;

/// Default confirmations required before a funding or deployment counts.
pub const DEFAULT_SAFE_FUNDING_CONFIRMATIONS: u64 = 0;

/// Receipt polls before a pending deployer funding is reconsidered.
pub const DEFAULT_CHECK_DEPLOYER_FUNDED_RETRIES: u32 = 10;

/// Base delay in seconds between deployer funding receipt polls.
pub const DEFAULT_CHECK_DEPLOYER_FUNDED_DELAY_SECS: u64 = 15;

/// Delay in seconds before the first deployer funding check after a transfer.
pub const DEPLOYER_FUNDED_CHECK_COUNTDOWN_SECS: u64 = 20;

/// Delay in seconds between legacy fund checks of a Safe that is not funded yet.
pub const FUND_DEPLOYER_RETRY_DELAY_SECS: u64 = 30;

/// Maximum ether (in whole ether) the funder is allowed to send in one transfer.
pub const DEFAULT_SAFE_FUNDER_MAX_ETH: u64 = 1;

/// Version string assumed when a deployed Safe does not expose `VERSION()`.
pub const DEFAULT_SAFE_VERSION: &str = "1.1.1";
