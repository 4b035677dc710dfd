use std::str::FromStr;

use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use strum::Display;

use super::SafeRelayError;

/// Operation executed by a Safe transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SafeOperation {
    #[default]
    Call,
    DelegateCall,
    Create,
}

impl SafeOperation {
    pub fn as_u8(&self) -> u8 {
        match self {
            SafeOperation::Call => 0,
            SafeOperation::DelegateCall => 1,
            SafeOperation::Create => 2,
        }
    }
}

impl TryFrom<u8> for SafeOperation {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SafeOperation::Call),
            1 => Ok(SafeOperation::DelegateCall),
            2 => Ok(SafeOperation::Create),
            other => Err(format!("Unknown Safe operation {other}")),
        }
    }
}

/// Safe contract releases with distinct EIP-712 encodings.
///
/// Unknown releases newer than the last listed one hash like `V1_4_1`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
pub enum SafeVersion {
    #[serde(rename = "0.0.1")]
    #[strum(serialize = "0.0.1")]
    V0_0_1,
    #[serde(rename = "1.0.0")]
    #[strum(serialize = "1.0.0")]
    V1_0_0,
    #[serde(rename = "1.1.1")]
    #[strum(serialize = "1.1.1")]
    V1_1_1,
    #[serde(rename = "1.2.0")]
    #[strum(serialize = "1.2.0")]
    V1_2_0,
    #[serde(rename = "1.3.0")]
    #[strum(serialize = "1.3.0")]
    V1_3_0,
    #[serde(rename = "1.4.1")]
    #[strum(serialize = "1.4.1")]
    V1_4_1,
}

impl SafeVersion {
    /// Releases before 1.0.0 named the refund gas field `dataGas`.
    pub fn uses_data_gas(&self) -> bool {
        matches!(self, SafeVersion::V0_0_1)
    }

    /// Releases from 1.3.0 bind the chain id into the domain separator.
    pub fn uses_chain_id(&self) -> bool {
        *self >= SafeVersion::V1_3_0
    }
}

impl FromStr for SafeVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Deployed Safes may report a suffix such as "1.3.0+L2"
        let core = s.trim().split(['+', '-']).next().unwrap_or_default();
        let mut parts = core.split('.').map(|p| p.parse::<u32>());
        let (major, minor) = match (parts.next(), parts.next()) {
            (Some(Ok(major)), Some(Ok(minor))) => (major, minor),
            _ => return Err(format!("Invalid Safe version: {s}")),
        };

        Ok(match (major, minor) {
            (0, _) => SafeVersion::V0_0_1,
            (1, 0) => SafeVersion::V1_0_0,
            (1, 1) => SafeVersion::V1_1_1,
            (1, 2) => SafeVersion::V1_2_0,
            (1, 3) => SafeVersion::V1_3_0,
            _ => SafeVersion::V1_4_1,
        })
    }
}

/// On-chain view of a deployed Safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeInfo {
    pub address: Address,
    pub nonce: U256,
    pub threshold: u64,
    pub owners: Vec<Address>,
    pub master_copy: Address,
    pub version: String,
}

/// Contracts and bytecode the relay builds and checks Safes against.
///
/// Loaded once at startup; `proxy_creation_code` is treated as a constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeContracts {
    pub master_copy: Address,
    pub legacy_master_copy: Option<Address>,
    pub valid_master_copies: Vec<Address>,
    pub proxy_factory: Address,
    pub fallback_handler: Address,
    pub proxy_creation_code: Bytes,
    /// Code of a deployed proxy. Relayed Safes must match it when known.
    pub proxy_runtime_code: Option<Bytes>,
    pub paying_proxy_code: Option<Bytes>,
    /// Version assumed for Safes that do not answer `VERSION()`.
    pub default_version: SafeVersion,
}

/// Owners must be non empty, distinct and non zero; `1 <= threshold <= owners`.
pub fn validate_owners_and_threshold(
    owners: &[Address],
    threshold: u64,
) -> Result<(), SafeRelayError> {
    if owners.is_empty() {
        return Err(SafeRelayError::InvalidOwners("at least one owner is required".into()));
    }
    if owners.iter().any(|a| a.is_zero()) {
        return Err(SafeRelayError::InvalidOwners("owner cannot be the zero address".into()));
    }
    let mut unique = owners.to_vec();
    unique.sort();
    unique.dedup();
    if unique.len() != owners.len() {
        return Err(SafeRelayError::InvalidOwners("owners must be unique".into()));
    }
    if threshold == 0 || threshold as usize > owners.len() {
        return Err(SafeRelayError::InvalidThreshold {
            threshold,
            owners: owners.len(),
        });
    }
    Ok(())
}
