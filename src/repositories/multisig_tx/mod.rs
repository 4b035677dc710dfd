//! Multisig Transaction Repository Module
//!
//! Relayed Safe transactions, unique per `(safe, nonce)`. Uniqueness is
//! enforced by the store so two concurrent relays of the same nonce cannot
//! both be recorded.

mod multisig_tx_in_memory;
mod multisig_tx_redis;

pub use multisig_tx_in_memory::InMemoryMultisigTxRepository;
pub use multisig_tx_redis::RedisMultisigTxRepository;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use crate::models::{RelayedMultisigTransaction, RepositoryError};

#[async_trait]
#[cfg_attr(test, automock)]
pub trait MultisigTxRepositoryTrait: Send + Sync {
    async fn exists(&self, safe: Address, nonce: U256) -> Result<bool, RepositoryError>;

    /// Fails with `ConstraintViolation` when `(safe, nonce)` was already relayed.
    async fn create(
        &self,
        tx: RelayedMultisigTransaction,
    ) -> Result<RelayedMultisigTransaction, RepositoryError>;

    async fn get(
        &self,
        safe: Address,
        nonce: U256,
    ) -> Result<RelayedMultisigTransaction, RepositoryError>;

    /// Highest Safe nonce relayed for `safe`.
    async fn get_last_nonce(&self, safe: Address) -> Result<Option<U256>, RepositoryError>;
}

#[derive(Debug, Clone)]
pub enum MultisigTxRepositoryStorage {
    InMemory(InMemoryMultisigTxRepository),
    Redis(RedisMultisigTxRepository),
}

impl MultisigTxRepositoryStorage {
    pub fn new_in_memory() -> Self {
        Self::InMemory(InMemoryMultisigTxRepository::new())
    }

    pub fn new_redis(
        connection_manager: Arc<ConnectionManager>,
        key_prefix: String,
    ) -> Result<Self, RepositoryError> {
        Ok(Self::Redis(RedisMultisigTxRepository::new(
            connection_manager,
            key_prefix,
        )?))
    }
}

#[async_trait]
impl MultisigTxRepositoryTrait for MultisigTxRepositoryStorage {
    async fn exists(&self, safe: Address, nonce: U256) -> Result<bool, RepositoryError> {
        match self {
            Self::InMemory(repo) => repo.exists(safe, nonce).await,
            Self::Redis(repo) => repo.exists(safe, nonce).await,
        }
    }

    async fn create(
        &self,
        tx: RelayedMultisigTransaction,
    ) -> Result<RelayedMultisigTransaction, RepositoryError> {
        match self {
            Self::InMemory(repo) => repo.create(tx).await,
            Self::Redis(repo) => repo.create(tx).await,
        }
    }

    async fn get(
        &self,
        safe: Address,
        nonce: U256,
    ) -> Result<RelayedMultisigTransaction, RepositoryError> {
        match self {
            Self::InMemory(repo) => repo.get(safe, nonce).await,
            Self::Redis(repo) => repo.get(safe, nonce).await,
        }
    }

    async fn get_last_nonce(&self, safe: Address) -> Result<Option<U256>, RepositoryError> {
        match self {
            Self::InMemory(repo) => repo.get_last_nonce(safe).await,
            Self::Redis(repo) => repo.get_last_nonce(safe).await,
        }
    }
}

#[cfg(test)]
pub(crate) fn create_test_relayed_tx(safe: Address, nonce: u64) -> RelayedMultisigTransaction {
    use crate::models::SafeOperation;
    use alloy::primitives::{Bytes, B256};

    RelayedMultisigTransaction {
        safe,
        to: Address::repeat_byte(0xaa),
        value: U256::ZERO,
        data: Bytes::new(),
        operation: SafeOperation::Call,
        safe_tx_gas: U256::from(50_000u64),
        base_gas: U256::from(40_000u64),
        gas_price: U256::from(10_000_000_000u64),
        gas_token: Address::ZERO,
        refund_receiver: Address::ZERO,
        nonce: U256::from(nonce),
        signatures: Bytes::from(vec![1u8; 65]),
        safe_tx_hash: B256::repeat_byte(0x01),
        tx_hash: B256::repeat_byte(0x02),
        tx_nonce: 3,
        tx_gas: 180_000,
        tx_gas_price: 20_000_000_000,
        created_at: chrono::Utc::now().to_rfc3339(),
    }
}
