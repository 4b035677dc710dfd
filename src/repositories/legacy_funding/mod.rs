//! Legacy Funding Repository Module
//!
//! Holds the signed legacy (CREATE) Safe creations and the funding record
//! the two-phase reconciler advances for each of them. Storing a creation
//! also opens its funding record so the reconciler picks it up.

mod legacy_funding_in_memory;
mod legacy_funding_redis;

pub use legacy_funding_in_memory::InMemoryLegacyFundingRepository;
pub use legacy_funding_redis::RedisLegacyFundingRepository;

use alloy::primitives::Address;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use crate::models::{
    LegacyFundingRecord, LegacyFundingUpdate, LegacySafeCreation, RepositoryError,
};

#[async_trait]
#[cfg_attr(test, automock)]
pub trait LegacyFundingRepositoryTrait: Send + Sync {
    /// Fails with `ConstraintViolation` when a creation exists for the Safe.
    async fn create_creation(
        &self,
        creation: LegacySafeCreation,
    ) -> Result<LegacySafeCreation, RepositoryError>;

    async fn get_creation(&self, safe: Address) -> Result<LegacySafeCreation, RepositoryError>;

    async fn get_or_create_funding(
        &self,
        safe: Address,
    ) -> Result<LegacyFundingRecord, RepositoryError>;

    async fn get_funding(&self, safe: Address) -> Result<LegacyFundingRecord, RepositoryError>;

    async fn update_funding(
        &self,
        safe: Address,
        update: LegacyFundingUpdate,
    ) -> Result<LegacyFundingRecord, RepositoryError>;

    /// Records of Safes that still wait for the Safe or the deployer to be funded.
    async fn list_pending_funding(&self) -> Result<Vec<LegacyFundingRecord>, RepositoryError>;

    /// Fully funded records whose Safe is not deployed yet.
    async fn list_pending_deploy(&self) -> Result<Vec<LegacyFundingRecord>, RepositoryError>;
}

pub(crate) fn is_pending_funding(record: &LegacyFundingRecord) -> bool {
    !record.safe_deployed && !record.is_all_funded()
}

pub(crate) fn is_pending_deploy(record: &LegacyFundingRecord) -> bool {
    !record.safe_deployed && !record.safe_deploy_reverted && record.is_all_funded()
}

#[derive(Debug, Clone)]
pub enum LegacyFundingRepositoryStorage {
    InMemory(InMemoryLegacyFundingRepository),
    Redis(RedisLegacyFundingRepository),
}

impl LegacyFundingRepositoryStorage {
    pub fn new_in_memory() -> Self {
        Self::InMemory(InMemoryLegacyFundingRepository::new())
    }

    pub fn new_redis(
        connection_manager: Arc<ConnectionManager>,
        key_prefix: String,
    ) -> Result<Self, RepositoryError> {
        Ok(Self::Redis(RedisLegacyFundingRepository::new(
            connection_manager,
            key_prefix,
        )?))
    }

    #[cfg(test)]
    pub(crate) async fn backdate_funding(&self, safe: Address, age: chrono::Duration) {
        if let Self::InMemory(repo) = self {
            repo.backdate_funding(safe, age).await;
        }
    }
}

#[async_trait]
impl LegacyFundingRepositoryTrait for LegacyFundingRepositoryStorage {
    async fn create_creation(
        &self,
        creation: LegacySafeCreation,
    ) -> Result<LegacySafeCreation, RepositoryError> {
        match self {
            Self::InMemory(repo) => repo.create_creation(creation).await,
            Self::Redis(repo) => repo.create_creation(creation).await,
        }
    }

    async fn get_creation(&self, safe: Address) -> Result<LegacySafeCreation, RepositoryError> {
        match self {
            Self::InMemory(repo) => repo.get_creation(safe).await,
            Self::Redis(repo) => repo.get_creation(safe).await,
        }
    }

    async fn get_or_create_funding(
        &self,
        safe: Address,
    ) -> Result<LegacyFundingRecord, RepositoryError> {
        match self {
            Self::InMemory(repo) => repo.get_or_create_funding(safe).await,
            Self::Redis(repo) => repo.get_or_create_funding(safe).await,
        }
    }

    async fn get_funding(&self, safe: Address) -> Result<LegacyFundingRecord, RepositoryError> {
        match self {
            Self::InMemory(repo) => repo.get_funding(safe).await,
            Self::Redis(repo) => repo.get_funding(safe).await,
        }
    }

    async fn update_funding(
        &self,
        safe: Address,
        update: LegacyFundingUpdate,
    ) -> Result<LegacyFundingRecord, RepositoryError> {
        match self {
            Self::InMemory(repo) => repo.update_funding(safe, update).await,
            Self::Redis(repo) => repo.update_funding(safe, update).await,
        }
    }

    async fn list_pending_funding(&self) -> Result<Vec<LegacyFundingRecord>, RepositoryError> {
        match self {
            Self::InMemory(repo) => repo.list_pending_funding().await,
            Self::Redis(repo) => repo.list_pending_funding().await,
        }
    }

    async fn list_pending_deploy(&self) -> Result<Vec<LegacyFundingRecord>, RepositoryError> {
        match self {
            Self::InMemory(repo) => repo.list_pending_deploy().await,
            Self::Redis(repo) => repo.list_pending_deploy().await,
        }
    }
}

#[cfg(test)]
pub(crate) fn create_test_creation(safe: Address) -> LegacySafeCreation {
    use alloy::primitives::{Bytes, B256, U256};

    LegacySafeCreation {
        safe,
        deployer: Address::repeat_byte(0xde),
        master_copy: Address::repeat_byte(0x0a),
        funder: Some(Address::repeat_byte(0xf0)),
        owners: vec![Address::repeat_byte(0x01), Address::repeat_byte(0x02)],
        threshold: 2,
        payment: U256::from(5_000_000_000_000_000u64),
        payment_token: None,
        gas: 400_000,
        gas_price: 10_000_000_000,
        v: 27,
        r: U256::from(12345u64),
        s: U256::from(67890u64),
        signed_tx: Bytes::from(vec![0xf8, 0x01]),
        tx_hash: B256::repeat_byte(0x33),
        created_at: chrono::Utc::now().to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_predicates() {
        let mut record = LegacyFundingRecord::new(Address::repeat_byte(1));
        assert!(is_pending_funding(&record));
        assert!(!is_pending_deploy(&record));

        record.safe_funded = true;
        record.deployer_funded = true;
        assert!(!is_pending_funding(&record));
        assert!(is_pending_deploy(&record));

        record.safe_deployed = true;
        assert!(!is_pending_funding(&record));
        assert!(!is_pending_deploy(&record));

        record.safe_deployed = false;
        record.safe_deploy_reverted = true;
        assert!(!is_pending_deploy(&record));
    }

    #[tokio::test]
    async fn test_enum_wrapper_delegation() {
        let repo = LegacyFundingRepositoryStorage::new_in_memory();
        let safe = Address::repeat_byte(9);
        repo.create_creation(create_test_creation(safe)).await.unwrap();

        assert_eq!(repo.get_creation(safe).await.unwrap().safe, safe);
        assert_eq!(repo.list_pending_funding().await.unwrap().len(), 1);

        repo.update_funding(
            safe,
            LegacyFundingUpdate {
                safe_funded: Some(true),
                deployer_funded: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(repo.list_pending_funding().await.unwrap().is_empty());
        assert_eq!(repo.list_pending_deploy().await.unwrap().len(), 1);
    }
}
