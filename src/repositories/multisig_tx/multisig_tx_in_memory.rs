use std::collections::BTreeMap;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::MultisigTxRepositoryTrait;
use crate::models::{RelayedMultisigTransaction, RepositoryError};

#[derive(Debug, Clone, Default)]
pub struct InMemoryMultisigTxRepository {
    store: Arc<Mutex<BTreeMap<(Address, U256), RelayedMultisigTransaction>>>,
}

impl InMemoryMultisigTxRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MultisigTxRepositoryTrait for InMemoryMultisigTxRepository {
    async fn exists(&self, safe: Address, nonce: U256) -> Result<bool, RepositoryError> {
        Ok(self.store.lock().await.contains_key(&(safe, nonce)))
    }

    async fn create(
        &self,
        tx: RelayedMultisigTransaction,
    ) -> Result<RelayedMultisigTransaction, RepositoryError> {
        let mut store = self.store.lock().await;
        let key = (tx.safe, tx.nonce);
        if store.contains_key(&key) {
            return Err(RepositoryError::ConstraintViolation(format!(
                "Multisig tx for safe {} with nonce {} already exists",
                tx.safe, tx.nonce
            )));
        }
        store.insert(key, tx.clone());
        Ok(tx)
    }

    async fn get(
        &self,
        safe: Address,
        nonce: U256,
    ) -> Result<RelayedMultisigTransaction, RepositoryError> {
        self.store
            .lock()
            .await
            .get(&(safe, nonce))
            .cloned()
            .ok_or_else(|| {
                RepositoryError::NotFound(format!(
                    "Multisig tx for safe {safe} with nonce {nonce} not found"
                ))
            })
    }

    async fn get_last_nonce(&self, safe: Address) -> Result<Option<U256>, RepositoryError> {
        let store = self.store.lock().await;
        Ok(store
            .range((safe, U256::ZERO)..=(safe, U256::MAX))
            .next_back()
            .map(|((_, nonce), _)| *nonce))
    }
}
