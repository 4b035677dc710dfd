use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::Address;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{is_pending_deploy, is_pending_funding, LegacyFundingRepositoryTrait};
use crate::models::{
    LegacyFundingRecord, LegacyFundingUpdate, LegacySafeCreation, RepositoryError,
};

#[derive(Debug, Default)]
struct Store {
    creations: HashMap<Address, LegacySafeCreation>,
    fundings: HashMap<Address, LegacyFundingRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryLegacyFundingRepository {
    store: Arc<Mutex<Store>>,
}

impl InMemoryLegacyFundingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn list_where<F>(&self, predicate: F) -> Vec<LegacyFundingRecord>
    where
        F: Fn(&LegacyFundingRecord) -> bool,
    {
        let store = self.store.lock().await;
        let mut records: Vec<LegacyFundingRecord> = store
            .fundings
            .values()
            .filter(|record| predicate(record))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.safe.cmp(&b.safe)));
        records
    }

    /// Moves the last modification of a funding record `age` into the past.
    #[cfg(test)]
    pub(crate) async fn backdate_funding(&self, safe: Address, age: chrono::Duration) {
        if let Some(record) = self.store.lock().await.fundings.get_mut(&safe) {
            record.modified_at = (chrono::Utc::now() - age).to_rfc3339();
        }
    }
}

#[async_trait]
impl LegacyFundingRepositoryTrait for InMemoryLegacyFundingRepository {
    async fn create_creation(
        &self,
        creation: LegacySafeCreation,
    ) -> Result<LegacySafeCreation, RepositoryError> {
        let mut store = self.store.lock().await;
        if store.creations.contains_key(&creation.safe) {
            return Err(RepositoryError::ConstraintViolation(format!(
                "Legacy creation for safe {} already exists",
                creation.safe
            )));
        }
        store
            .fundings
            .entry(creation.safe)
            .or_insert_with(|| LegacyFundingRecord::new(creation.safe));
        store.creations.insert(creation.safe, creation.clone());
        Ok(creation)
    }

    async fn get_creation(&self, safe: Address) -> Result<LegacySafeCreation, RepositoryError> {
        self.store
            .lock()
            .await
            .creations
            .get(&safe)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("Legacy creation {safe} not found")))
    }

    async fn get_or_create_funding(
        &self,
        safe: Address,
    ) -> Result<LegacyFundingRecord, RepositoryError> {
        let mut store = self.store.lock().await;
        Ok(store
            .fundings
            .entry(safe)
            .or_insert_with(|| LegacyFundingRecord::new(safe))
            .clone())
    }

    async fn get_funding(&self, safe: Address) -> Result<LegacyFundingRecord, RepositoryError> {
        self.store
            .lock()
            .await
            .fundings
            .get(&safe)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("Safe funding {safe} not found")))
    }

    async fn update_funding(
        &self,
        safe: Address,
        update: LegacyFundingUpdate,
    ) -> Result<LegacyFundingRecord, RepositoryError> {
        let mut store = self.store.lock().await;
        let record = store
            .fundings
            .get_mut(&safe)
            .ok_or_else(|| RepositoryError::NotFound(format!("Safe funding {safe} not found")))?;
        update.apply(record);
        Ok(record.clone())
    }

    async fn list_pending_funding(&self) -> Result<Vec<LegacyFundingRecord>, RepositoryError> {
        Ok(self.list_where(is_pending_funding).await)
    }

    async fn list_pending_deploy(&self) -> Result<Vec<LegacyFundingRecord>, RepositoryError> {
        Ok(self.list_where(is_pending_deploy).await)
    }
}
