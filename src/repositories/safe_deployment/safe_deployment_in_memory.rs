use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{apply_submission, owners_salt_id, SafeDeploymentRepositoryTrait};
use crate::models::{RepositoryError, SafeDeploymentIntent, TxSubmission};

#[derive(Debug, Default)]
struct Store {
    intents: HashMap<Address, SafeDeploymentIntent>,
    owners_index: HashMap<String, Address>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemorySafeDeploymentRepository {
    store: Arc<Mutex<Store>>,
}

impl InMemorySafeDeploymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn list_where<F>(&self, predicate: F) -> Vec<SafeDeploymentIntent>
    where
        F: Fn(&SafeDeploymentIntent) -> bool,
    {
        let store = self.store.lock().await;
        let mut intents: Vec<SafeDeploymentIntent> = store
            .intents
            .values()
            .filter(|intent| predicate(intent))
            .cloned()
            .collect();
        intents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.safe.cmp(&b.safe)));
        intents
    }

    async fn update<F>(&self, safe: Address, f: F) -> Result<SafeDeploymentIntent, RepositoryError>
    where
        F: FnOnce(&mut SafeDeploymentIntent),
    {
        let mut store = self.store.lock().await;
        let intent = store
            .intents
            .get_mut(&safe)
            .ok_or_else(|| RepositoryError::NotFound(format!("Safe deployment {safe} not found")))?;
        f(intent);
        Ok(intent.clone())
    }
}

#[async_trait]
impl SafeDeploymentRepositoryTrait for InMemorySafeDeploymentRepository {
    async fn create(
        &self,
        intent: SafeDeploymentIntent,
    ) -> Result<SafeDeploymentIntent, RepositoryError> {
        let mut store = self.store.lock().await;
        if store.intents.contains_key(&intent.safe) {
            return Err(RepositoryError::ConstraintViolation(format!(
                "Safe deployment {} already exists",
                intent.safe
            )));
        }
        store.owners_index.insert(
            owners_salt_id(&intent.owners, intent.salt_nonce),
            intent.safe,
        );
        store.intents.insert(intent.safe, intent.clone());
        Ok(intent)
    }

    async fn get_by_address(&self, safe: Address) -> Result<SafeDeploymentIntent, RepositoryError> {
        self.store
            .lock()
            .await
            .intents
            .get(&safe)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("Safe deployment {safe} not found")))
    }

    async fn get_by_owners_and_salt(
        &self,
        owners: Vec<Address>,
        salt_nonce: U256,
    ) -> Result<Option<SafeDeploymentIntent>, RepositoryError> {
        let store = self.store.lock().await;
        Ok(store
            .owners_index
            .get(&owners_salt_id(&owners, salt_nonce))
            .and_then(|safe| store.intents.get(safe))
            .cloned())
    }

    async fn list_pending_deploy(&self) -> Result<Vec<SafeDeploymentIntent>, RepositoryError> {
        Ok(self.list_where(|intent| !intent.is_submitted()).await)
    }

    async fn list_unconfirmed(&self) -> Result<Vec<SafeDeploymentIntent>, RepositoryError> {
        Ok(self
            .list_where(|intent| intent.is_submitted() && !intent.is_confirmed())
            .await)
    }

    async fn set_tx_submission(
        &self,
        safe: Address,
        submission: TxSubmission,
    ) -> Result<SafeDeploymentIntent, RepositoryError> {
        self.update(safe, |intent| apply_submission(intent, submission))
            .await
    }

    async fn set_confirmed_block(
        &self,
        safe: Address,
        block_number: u64,
    ) -> Result<SafeDeploymentIntent, RepositoryError> {
        self.update(safe, |intent| intent.confirmed_block = Some(block_number))
            .await
    }

    async fn set_code_seen_block(
        &self,
        safe: Address,
        block_number: u64,
    ) -> Result<SafeDeploymentIntent, RepositoryError> {
        self.update(safe, |intent| intent.code_seen_block = Some(block_number))
            .await
    }
}
