use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use strum::Display;

use super::{validate_owners_and_threshold, SafeRelayError};

/// Immutable plan of a Safe created through a one-shot deployer account.
///
/// `safe` is always `CREATE(deployer, 0)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacySafeCreation {
    pub safe: Address,
    pub deployer: Address,
    pub master_copy: Address,
    pub funder: Option<Address>,
    pub owners: Vec<Address>,
    pub threshold: u64,
    pub payment: U256,
    pub payment_token: Option<Address>,
    pub gas: u64,
    pub gas_price: u128,
    pub v: u8,
    pub r: U256,
    pub s: U256,
    pub signed_tx: Bytes,
    pub tx_hash: B256,
    pub created_at: String,
}

impl LegacySafeCreation {
    /// Ether the deployer spends to send the creation tx.
    pub fn deploy_cost(&self) -> U256 {
        U256::from(self.gas) * U256::from(self.gas_price)
    }

    pub fn payment_token(&self) -> Option<Address> {
        self.payment_token.filter(|token| !token.is_zero())
    }
}

/// Progress of a legacy Safe through funding and deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyFundingRecord {
    pub safe: Address,
    pub safe_funded: bool,
    pub deployer_funded: bool,
    pub deployer_funded_tx_hash: Option<B256>,
    pub safe_deployed: bool,
    pub safe_deployed_tx_hash: Option<B256>,
    /// The creation tx was mined but reverted. Its deployer nonce is spent.
    #[serde(default)]
    pub safe_deploy_reverted: bool,
    pub deployer_check_attempts: u32,
    pub created_at: String,
    pub modified_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LegacyFundingState {
    NotFunded,
    SafeFunded,
    DeployerFundedPending,
    DeployerFunded,
    SafeDeployPending,
    Deployed,
    DeployReverted,
}

impl LegacyFundingRecord {
    pub fn new(safe: Address) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            safe,
            safe_funded: false,
            deployer_funded: false,
            deployer_funded_tx_hash: None,
            safe_deployed: false,
            safe_deployed_tx_hash: None,
            safe_deploy_reverted: false,
            deployer_check_attempts: 0,
            created_at: now.clone(),
            modified_at: now,
        }
    }

    pub fn state(&self) -> LegacyFundingState {
        if self.safe_deployed {
            LegacyFundingState::Deployed
        } else if self.safe_deploy_reverted {
            LegacyFundingState::DeployReverted
        } else if self.safe_deployed_tx_hash.is_some() {
            LegacyFundingState::SafeDeployPending
        } else if self.deployer_funded {
            LegacyFundingState::DeployerFunded
        } else if self.deployer_funded_tx_hash.is_some() {
            LegacyFundingState::DeployerFundedPending
        } else if self.safe_funded {
            LegacyFundingState::SafeFunded
        } else {
            LegacyFundingState::NotFunded
        }
    }

    pub fn is_all_funded(&self) -> bool {
        self.safe_funded && self.deployer_funded
    }
}

/// Partial update of a [`LegacyFundingRecord`]; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyFundingUpdate {
    pub safe_funded: Option<bool>,
    pub deployer_funded: Option<bool>,
    pub deployer_funded_tx_hash: Option<Option<B256>>,
    pub safe_deployed: Option<bool>,
    pub safe_deployed_tx_hash: Option<Option<B256>>,
    pub safe_deploy_reverted: Option<bool>,
    pub deployer_check_attempts: Option<u32>,
}

impl LegacyFundingUpdate {
    pub fn apply(&self, record: &mut LegacyFundingRecord) {
        if let Some(value) = self.safe_funded {
            record.safe_funded = value;
        }
        if let Some(value) = self.deployer_funded {
            record.deployer_funded = value;
        }
        if let Some(value) = self.deployer_funded_tx_hash {
            record.deployer_funded_tx_hash = value;
        }
        if let Some(value) = self.safe_deployed {
            record.safe_deployed = value;
        }
        if let Some(value) = self.safe_deployed_tx_hash {
            record.safe_deployed_tx_hash = value;
        }
        if let Some(value) = self.safe_deploy_reverted {
            record.safe_deploy_reverted = value;
        }
        if let Some(value) = self.deployer_check_attempts {
            record.deployer_check_attempts = value;
        }
        record.modified_at = chrono::Utc::now().to_rfc3339();
    }
}

/// Request for a Safe deployed through a one-shot deployer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyCreationRequest {
    /// Client chosen `s` of the deployer signature.
    pub s: U256,
    pub owners: Vec<Address>,
    pub threshold: u64,
    pub payment_token: Option<Address>,
}

impl LegacyCreationRequest {
    pub fn validate(&self) -> Result<(), SafeRelayError> {
        validate_owners_and_threshold(&self.owners, self.threshold)
    }

    pub fn payment_token(&self) -> Option<Address> {
        self.payment_token.filter(|token| !token.is_zero())
    }
}
