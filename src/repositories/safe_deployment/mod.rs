//! Safe Deployment Repository Module
//!
//! CREATE2 deployment intents. An intent is keyed by the predicted Safe
//! address and additionally indexed by `(owners, salt_nonce)` so a repeated
//! creation request finds the existing Safe.
//!
//! The reconciler walks two views of the store:
//! - intents without a deployment tx ([`SafeDeploymentRepositoryTrait::list_pending_deploy`])
//! - intents with a tx that is not confirmed yet ([`SafeDeploymentRepositoryTrait::list_unconfirmed`])

mod safe_deployment_in_memory;
mod safe_deployment_redis;

pub use safe_deployment_in_memory::InMemorySafeDeploymentRepository;
pub use safe_deployment_redis::RedisSafeDeploymentRepository;

use alloy::primitives::{keccak256, Address, U256};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use crate::models::{RepositoryError, SafeDeploymentIntent, TxSubmission};

#[async_trait]
#[cfg_attr(test, automock)]
pub trait SafeDeploymentRepositoryTrait: Send + Sync {
    /// Fails with `ConstraintViolation` when an intent exists for the address.
    async fn create(
        &self,
        intent: SafeDeploymentIntent,
    ) -> Result<SafeDeploymentIntent, RepositoryError>;

    async fn get_by_address(&self, safe: Address) -> Result<SafeDeploymentIntent, RepositoryError>;

    async fn get_by_owners_and_salt(
        &self,
        owners: Vec<Address>,
        salt_nonce: U256,
    ) -> Result<Option<SafeDeploymentIntent>, RepositoryError>;

    /// Intents no deployment tx was sent for yet.
    async fn list_pending_deploy(&self) -> Result<Vec<SafeDeploymentIntent>, RepositoryError>;

    /// Intents with a deployment tx that is not confirmed yet.
    async fn list_unconfirmed(&self) -> Result<Vec<SafeDeploymentIntent>, RepositoryError>;

    /// Records a sent deployment tx, replacing any previous one.
    async fn set_tx_submission(
        &self,
        safe: Address,
        submission: TxSubmission,
    ) -> Result<SafeDeploymentIntent, RepositoryError>;

    async fn set_confirmed_block(
        &self,
        safe: Address,
        block_number: u64,
    ) -> Result<SafeDeploymentIntent, RepositoryError>;

    async fn set_code_seen_block(
        &self,
        safe: Address,
        block_number: u64,
    ) -> Result<SafeDeploymentIntent, RepositoryError>;
}

/// Index id of an owner set and salt. Owner order is significant, it is part
/// of the Safe setup data.
pub(crate) fn owners_salt_id(owners: &[Address], salt_nonce: U256) -> String {
    let mut packed = Vec::with_capacity(owners.len() * 20 + 32);
    for owner in owners {
        packed.extend_from_slice(owner.as_slice());
    }
    packed.extend_from_slice(&salt_nonce.to_be_bytes::<32>());
    keccak256(packed).to_string()
}

pub(crate) fn apply_submission(intent: &mut SafeDeploymentIntent, submission: TxSubmission) {
    if !intent.submitted_tx_hashes.contains(&submission.tx_hash) {
        intent.submitted_tx_hashes.push(submission.tx_hash);
    }
    intent.tx_hash = Some(submission.tx_hash);
    intent.tx_nonce = Some(submission.nonce);
    intent.tx_gas_price = Some(submission.gas_price);
    intent.tx_submitted_at = Some(submission.submitted_at);
}

#[derive(Debug, Clone)]
pub enum SafeDeploymentRepositoryStorage {
    InMemory(InMemorySafeDeploymentRepository),
    Redis(RedisSafeDeploymentRepository),
}

impl SafeDeploymentRepositoryStorage {
    pub fn new_in_memory() -> Self {
        Self::InMemory(InMemorySafeDeploymentRepository::new())
    }

    pub fn new_redis(
        connection_manager: Arc<ConnectionManager>,
        key_prefix: String,
    ) -> Result<Self, RepositoryError> {
        Ok(Self::Redis(RedisSafeDeploymentRepository::new(
            connection_manager,
            key_prefix,
        )?))
    }
}

#[async_trait]
impl SafeDeploymentRepositoryTrait for SafeDeploymentRepositoryStorage {
    async fn create(
        &self,
        intent: SafeDeploymentIntent,
    ) -> Result<SafeDeploymentIntent, RepositoryError> {
        match self {
            Self::InMemory(repo) => repo.create(intent).await,
            Self::Redis(repo) => repo.create(intent).await,
        }
    }

    async fn get_by_address(&self, safe: Address) -> Result<SafeDeploymentIntent, RepositoryError> {
        match self {
            Self::InMemory(repo) => repo.get_by_address(safe).await,
            Self::Redis(repo) => repo.get_by_address(safe).await,
        }
    }

    async fn get_by_owners_and_salt(
        &self,
        owners: Vec<Address>,
        salt_nonce: U256,
    ) -> Result<Option<SafeDeploymentIntent>, RepositoryError> {
        match self {
            Self::InMemory(repo) => repo.get_by_owners_and_salt(owners, salt_nonce).await,
            Self::Redis(repo) => repo.get_by_owners_and_salt(owners, salt_nonce).await,
        }
    }

    async fn list_pending_deploy(&self) -> Result<Vec<SafeDeploymentIntent>, RepositoryError> {
        match self {
            Self::InMemory(repo) => repo.list_pending_deploy().await,
            Self::Redis(repo) => repo.list_pending_deploy().await,
        }
    }

    async fn list_unconfirmed(&self) -> Result<Vec<SafeDeploymentIntent>, RepositoryError> {
        match self {
            Self::InMemory(repo) => repo.list_unconfirmed().await,
            Self::Redis(repo) => repo.list_unconfirmed().await,
        }
    }

    async fn set_tx_submission(
        &self,
        safe: Address,
        submission: TxSubmission,
    ) -> Result<SafeDeploymentIntent, RepositoryError> {
        match self {
            Self::InMemory(repo) => repo.set_tx_submission(safe, submission).await,
            Self::Redis(repo) => repo.set_tx_submission(safe, submission).await,
        }
    }

    async fn set_confirmed_block(
        &self,
        safe: Address,
        block_number: u64,
    ) -> Result<SafeDeploymentIntent, RepositoryError> {
        match self {
            Self::InMemory(repo) => repo.set_confirmed_block(safe, block_number).await,
            Self::Redis(repo) => repo.set_confirmed_block(safe, block_number).await,
        }
    }

    async fn set_code_seen_block(
        &self,
        safe: Address,
        block_number: u64,
    ) -> Result<SafeDeploymentIntent, RepositoryError> {
        match self {
            Self::InMemory(repo) => repo.set_code_seen_block(safe, block_number).await,
            Self::Redis(repo) => repo.set_code_seen_block(safe, block_number).await,
        }
    }
}

#[cfg(test)]
pub(crate) fn create_test_intent(safe: Address, salt_nonce: u64) -> SafeDeploymentIntent {
    use alloy::primitives::Bytes;

    SafeDeploymentIntent {
        safe,
        master_copy: Address::repeat_byte(0x0a),
        proxy_factory: Address::repeat_byte(0x0f),
        salt_nonce: U256::from(salt_nonce),
        owners: vec![Address::repeat_byte(0x01), Address::repeat_byte(0x02)],
        threshold: 2,
        to: None,
        payment_token: None,
        payment: U256::from(1_000_000u64),
        payment_receiver: Address::ZERO,
        setup_data: Bytes::from(vec![0xb6, 0x3e, 0x80, 0x0d]),
        gas_estimated: 250_000,
        gas_price_estimated: 20_000_000_000,
        tx_hash: None,
        tx_nonce: None,
        tx_gas_price: None,
        tx_submitted_at: None,
        submitted_tx_hashes: Vec::new(),
        code_seen_block: None,
        confirmed_block: None,
        created_at: chrono::Utc::now().to_rfc3339(),
    }
}

#[cfg(test)]
pub(crate) fn create_test_submission(byte: u8, nonce: u64) -> TxSubmission {
    TxSubmission {
        tx_hash: alloy::primitives::B256::repeat_byte(byte),
        nonce,
        gas_price: 20_000_000_000,
        submitted_at: chrono::Utc::now().to_rfc3339(),
    }
}
