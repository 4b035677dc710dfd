// Number of retries for the CREATE2 deploy job while the Safe is not funded yet
pub const WORKER_CREATE2_DEPLOY_RETRIES: usize = 10;

// Number of retries for the legacy fund check job
pub const WORKER_FUND_DEPLOYER_RETRIES: usize = 25;

// Retries of the deployer funded check come from the persisted attempt counter
pub const WORKER_DEFAULT_MAXIMUM_RETRIES: usize = 5;

// Capacity of the on-demand job channel
pub const JOB_CHANNEL_CAPACITY: usize = 1024;

/// Cron expression for the gas price refresh: runs every minute
pub const GAS_PRICE_REFRESH_CRON_SCHEDULE: &str = "0 * * * * *";

/// Cron expression for the legacy fund check: runs every 20 seconds
pub const LEGACY_FUND_CHECK_CRON_SCHEDULE: &str = "*/20 * * * * *";

/// Cron expression for the legacy deploy pass: runs every 20 seconds
pub const LEGACY_DEPLOY_CRON_SCHEDULE: &str = "10/20 * * * * *";

/// Cron expression for CREATE2 confirmation and replace-by-fee: runs every minute
pub const CREATE2_CONFIRMATION_CRON_SCHEDULE: &str = "30 * * * * *";

/// Cron expression for deploying funded CREATE2 Safes missed by a signal: runs every minute
pub const CREATE2_DEPLOY_CRON_SCHEDULE: &str = "45 * * * * *";

/// TTL for the task level distributed locks. Must outlast the slowest pass.
pub const TASK_LOCK_TTL_SECS: u64 = 120;

/// TTL of the `(safe, nonce)` reservation held while a multisig tx is relayed.
pub const MULTISIG_TX_RESERVATION_TTL_SECS: u64 = 120;

/// TTL of the per signing key nonce lock.
pub const NONCE_LOCK_TTL_SECS: u64 = 120;

/// How long a caller waits for a nonce lock before giving up.
pub const NONCE_LOCK_WAIT_TIMEOUT_SECS: u64 = 60;

/// Lifetime of a cached nonce counter.
pub const NONCE_KEY_TIMEOUT_SECS: u64 = 60;

/// Poll interval while waiting on a held distributed lock.
pub const LOCK_POLL_INTERVAL_MS: u64 = 100;
