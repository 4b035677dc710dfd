//! Configuration read from environment variables.
use std::{env, fmt, str::FromStr};

use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::constants::{
    DEFAULT_CHECK_DEPLOYER_FUNDED_DELAY_SECS, DEFAULT_CHECK_DEPLOYER_FUNDED_RETRIES,
    DEFAULT_CREATE2_REPLACE_TIMEOUT_MINUTES, DEFAULT_GAS_STATION_NUMBER_BLOCKS,
    DEFAULT_LEGACY_DEPLOY_TIMEOUT_MINUTES, DEFAULT_REDIS_KEY_PREFIX,
    DEFAULT_SAFE_FUNDER_MAX_ETH, DEFAULT_SAFE_FUNDING_CONFIRMATIONS, DEFAULT_SAFE_VERSION,
    MIN_BUMP_FACTOR,
};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    MissingVar(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryStorageType {
    #[default]
    InMemory,
    Redis,
}

/// Hex encoded private key, wiped from memory on drop and never printed.
#[derive(Clone)]
pub struct SecretKey(Zeroizing<String>);

impl SecretKey {
    pub fn new(value: &str) -> Self {
        Self(Zeroizing::new(value.trim().to_string()))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(***)")
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub redis_url: String,
    pub redis_key_prefix: String,
    pub redis_connection_timeout_ms: u64,
    pub repository_storage_type: RepositoryStorageType,

    pub ethereum_node_url: String,
    pub rpc_timeout_ms: u64,
    pub provider_max_retries: u8,
    pub provider_retry_base_delay_ms: u64,
    pub provider_retry_max_delay_ms: u64,

    pub safe_contract_address: Address,
    pub safe_old_contract_address: Option<Address>,
    pub safe_valid_contract_addresses: Vec<Address>,
    pub safe_proxy_factory_address: Address,
    pub safe_default_callback_handler: Address,
    pub safe_proxy_creation_code: Option<Bytes>,
    pub safe_paying_proxy_code: Option<Bytes>,
    pub safe_funder_private_key: SecretKey,
    pub safe_tx_sender_private_key: SecretKey,
    pub safe_funder_max_eth: U256,
    pub safe_fixed_creation_cost: Option<U256>,
    pub safe_funding_confirmations: u64,
    pub safe_check_deployer_funded_retries: u32,
    pub safe_check_deployer_funded_delay: u64,
    pub safe_deploy_timeout_minutes: i64,
    pub safe_create2_replace_timeout_minutes: i64,
    pub safe_gas_bump_factor: f64,
    pub safe_version: String,

    /// Gas price in gwei served by the fixed gas station instead of sampling blocks
    pub fixed_gas_price: Option<u128>,
    pub gas_station_number_blocks: u64,
}

fn parse_value<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

fn env_opt<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => parse_value(name, &raw).map(Some),
        _ => Ok(None),
    }
}

fn env_or<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    Ok(env_opt(name)?.unwrap_or(default))
}

fn env_required<T>(name: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    env_opt(name)?.ok_or_else(|| ConfigError::MissingVar(name.to_string()))
}

fn env_address_list(name: &str) -> Result<Vec<Address>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| parse_value::<Address>(name, item))
            .collect(),
        Err(_) => Ok(Vec::new()),
    }
}

/// Converts a decimal ether amount such as `0.1` into wei.
fn parse_ether(name: &str, raw: &str) -> Result<U256, ConfigError> {
    let value: f64 = parse_value(name, raw)?;
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("{raw} is not a positive ether amount"),
        });
    }
    Ok(U256::from((value * 1e18).round() as u128))
}

impl ServerConfig {
    /// Reads the configuration from the environment.
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let safe_tx_sender_private_key = SecretKey::new(
            &env::var("SAFE_TX_SENDER_PRIVATE_KEY")
                .map_err(|_| ConfigError::MissingVar("SAFE_TX_SENDER_PRIVATE_KEY".to_string()))?,
        );
        let safe_funder_private_key = env::var("SAFE_FUNDER_PRIVATE_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(|key| SecretKey::new(&key))
            .unwrap_or_else(|| safe_tx_sender_private_key.clone());

        let safe_funder_max_eth = match env::var("SAFE_FUNDER_MAX_ETH") {
            Ok(raw) if !raw.trim().is_empty() => parse_ether("SAFE_FUNDER_MAX_ETH", &raw)?,
            _ => U256::from(DEFAULT_SAFE_FUNDER_MAX_ETH) * U256::from(10u64).pow(U256::from(18)),
        };

        let fixed_gas_price = env_opt::<u128>("FIXED_GAS_PRICE")?;

        Ok(Self {
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379".to_string())?,
            redis_key_prefix: env_or("REDIS_KEY_PREFIX", DEFAULT_REDIS_KEY_PREFIX.to_string())?,
            redis_connection_timeout_ms: env_or("REDIS_CONNECTION_TIMEOUT_MS", 10_000)?,
            repository_storage_type: env_or(
                "REPOSITORY_STORAGE_TYPE",
                RepositoryStorageType::InMemory,
            )?,

            ethereum_node_url: env_or("ETHEREUM_NODE_URL", "http://localhost:8545".to_string())?,
            rpc_timeout_ms: env_or("RPC_TIMEOUT_MS", 10_000)?,
            provider_max_retries: env_or("PROVIDER_MAX_RETRIES", 3)?,
            provider_retry_base_delay_ms: env_or("PROVIDER_RETRY_BASE_DELAY_MS", 100)?,
            provider_retry_max_delay_ms: env_or("PROVIDER_RETRY_MAX_DELAY_MS", 2_000)?,

            safe_contract_address: env_required("SAFE_CONTRACT_ADDRESS")?,
            safe_old_contract_address: env_opt("SAFE_OLD_CONTRACT_ADDRESS")?,
            safe_valid_contract_addresses: env_address_list("SAFE_VALID_CONTRACT_ADDRESSES")?,
            safe_proxy_factory_address: env_required("SAFE_PROXY_FACTORY_ADDRESS")?,
            safe_default_callback_handler: env_or("SAFE_DEFAULT_CALLBACK_HANDLER", Address::ZERO)?,
            safe_proxy_creation_code: env_opt("SAFE_PROXY_CREATION_CODE")?,
            safe_paying_proxy_code: env_opt("SAFE_PAYING_PROXY_CODE")?,
            safe_funder_private_key,
            safe_tx_sender_private_key,
            safe_funder_max_eth,
            safe_fixed_creation_cost: env_opt("SAFE_FIXED_CREATION_COST")?,
            safe_funding_confirmations: env_or(
                "SAFE_FUNDING_CONFIRMATIONS",
                DEFAULT_SAFE_FUNDING_CONFIRMATIONS,
            )?,
            safe_check_deployer_funded_retries: env_or(
                "SAFE_CHECK_DEPLOYER_FUNDED_RETRIES",
                DEFAULT_CHECK_DEPLOYER_FUNDED_RETRIES,
            )?,
            safe_check_deployer_funded_delay: env_or(
                "SAFE_CHECK_DEPLOYER_FUNDED_DELAY",
                DEFAULT_CHECK_DEPLOYER_FUNDED_DELAY_SECS,
            )?,
            safe_deploy_timeout_minutes: env_or(
                "SAFE_DEPLOY_TIMEOUT_MINUTES",
                DEFAULT_LEGACY_DEPLOY_TIMEOUT_MINUTES,
            )?,
            safe_create2_replace_timeout_minutes: env_or(
                "SAFE_CREATE2_REPLACE_TIMEOUT_MINUTES",
                DEFAULT_CREATE2_REPLACE_TIMEOUT_MINUTES,
            )?,
            safe_gas_bump_factor: env_or("SAFE_GAS_BUMP_FACTOR", MIN_BUMP_FACTOR)?,
            safe_version: env_or("SAFE_VERSION", DEFAULT_SAFE_VERSION.to_string())?,

            fixed_gas_price,
            gas_station_number_blocks: env_or(
                "GAS_STATION_NUMBER_BLOCKS",
                DEFAULT_GAS_STATION_NUMBER_BLOCKS,
            )?,
        })
    }

    /// Master copies a relayed Safe may point to.
    pub fn valid_master_copies(&self) -> Vec<Address> {
        let mut valid = vec![self.safe_contract_address];
        valid.extend(self.safe_old_contract_address);
        valid.extend(self.safe_valid_contract_addresses.iter().copied());
        valid.sort();
        valid.dedup();
        valid
    }
}
