pub const DEFAULT_REDIS_KEY_PREFIX: &str = "safe-relay";

pub const SAFE_DEPLOYMENT_KEY: &str = "safe_deployment";
pub const SAFE_DEPLOYMENT_OWNERS_INDEX_KEY: &str = "safe_deployment_owners";
pub const SAFE_DEPLOYMENT_UNCONFIRMED_KEY: &str = "safe_deployment_unconfirmed";
pub const LEGACY_CREATION_KEY: &str = "legacy_creation";
pub const LEGACY_FUNDING_KEY: &str = "legacy_funding";
pub const LEGACY_FUNDING_INDEX_KEY: &str = "legacy_funding_safes";
pub const MULTISIG_TX_KEY: &str = "multisig_tx";
pub const MULTISIG_TX_NONCES_KEY: &str = "multisig_tx_nonces";
pub const TOKEN_KEY: &str = "token";
pub const TOKEN_INDEX_KEY: &str = "tokens";
pub const NONCE_KEY: &str = "nonce";
pub const LOCKS_KEY: &str = "locks";
