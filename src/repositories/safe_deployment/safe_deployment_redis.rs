//! Redis storage of CREATE2 deployment intents.
//!
//! Keys:
//! - `{prefix}:safe_deployment:{safe}` JSON intent, written with SET NX
//! - `{prefix}:safe_deployment_owners:{keccak(owners, salt)}` the Safe address
//! - `{prefix}:safe_deployment_unconfirmed` set of Safes not confirmed yet
use std::fmt;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use super::{apply_submission, owners_salt_id, SafeDeploymentRepositoryTrait};
use crate::constants::{
    SAFE_DEPLOYMENT_KEY, SAFE_DEPLOYMENT_OWNERS_INDEX_KEY, SAFE_DEPLOYMENT_UNCONFIRMED_KEY,
};
use crate::models::{RepositoryError, SafeDeploymentIntent, TxSubmission};
use crate::repositories::redis_base::RedisRepository;

const ENTITY: &str = "SafeDeploymentIntent";

#[derive(Clone)]
pub struct RedisSafeDeploymentRepository {
    pub client: Arc<ConnectionManager>,
    pub key_prefix: String,
}

impl RedisRepository for RedisSafeDeploymentRepository {
    fn key_prefix(&self) -> &str {
        &self.key_prefix
    }
}

impl fmt::Debug for RedisSafeDeploymentRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisSafeDeploymentRepository")
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

impl RedisSafeDeploymentRepository {
    pub fn new(
        connection_manager: Arc<ConnectionManager>,
        key_prefix: String,
    ) -> Result<Self, RepositoryError> {
        if key_prefix.is_empty() {
            return Err(RepositoryError::InvalidData(
                "Redis key prefix cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            client: connection_manager,
            key_prefix,
        })
    }

    fn intent_key(&self, safe: Address) -> String {
        self.entity_key(SAFE_DEPLOYMENT_KEY, &safe.to_string())
    }

    fn owners_key(&self, owners: &[Address], salt_nonce: U256) -> String {
        self.entity_key(
            SAFE_DEPLOYMENT_OWNERS_INDEX_KEY,
            &owners_salt_id(owners, salt_nonce),
        )
    }

    fn unconfirmed_key(&self) -> String {
        format!("{}:{}", self.key_prefix, SAFE_DEPLOYMENT_UNCONFIRMED_KEY)
    }

    async fn find(&self, safe: Address) -> Result<Option<SafeDeploymentIntent>, RepositoryError> {
        let mut conn = self.client.as_ref().clone();
        let json: Option<String> = conn
            .get(self.intent_key(safe))
            .await
            .map_err(|e| self.map_redis_error(e, "get_safe_deployment"))?;
        json.map(|json| self.deserialize_entity(&json, &safe.to_string(), ENTITY))
            .transpose()
    }

    async fn store(&self, intent: &SafeDeploymentIntent) -> Result<(), RepositoryError> {
        let json = self.serialize_entity(intent, |i| i.safe.to_string(), ENTITY)?;
        let mut conn = self.client.as_ref().clone();
        let mut pipe = redis::pipe();
        pipe.atomic().set(self.intent_key(intent.safe), json).ignore();
        if intent.is_confirmed() {
            pipe.srem(self.unconfirmed_key(), intent.safe.to_string())
                .ignore();
        }
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(|e| self.map_redis_error(e, "store_safe_deployment"))
    }

    async fn update<F>(&self, safe: Address, f: F) -> Result<SafeDeploymentIntent, RepositoryError>
    where
        F: FnOnce(&mut SafeDeploymentIntent) + Send,
    {
        let mut intent = self
            .find(safe)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("Safe deployment {safe} not found")))?;
        f(&mut intent);
        self.store(&intent).await?;
        Ok(intent)
    }

    async fn list_unconfirmed_set(&self) -> Result<Vec<SafeDeploymentIntent>, RepositoryError> {
        let mut conn = self.client.as_ref().clone();
        let members: Vec<String> = conn
            .smembers(self.unconfirmed_key())
            .await
            .map_err(|e| self.map_redis_error(e, "list_unconfirmed_safes"))?;
        if members.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = members
            .iter()
            .map(|member| self.entity_key(SAFE_DEPLOYMENT_KEY, member))
            .collect();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.map_redis_error(e, "list_unconfirmed_safes_mget"))?;

        let mut intents = Vec::with_capacity(values.len());
        for (member, json) in members.iter().zip(values) {
            if let Some(json) = json {
                intents.push(self.deserialize_entity::<SafeDeploymentIntent>(&json, member, ENTITY)?);
            }
        }
        intents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.safe.cmp(&b.safe)));
        Ok(intents)
    }
}

#[async_trait]
impl SafeDeploymentRepositoryTrait for RedisSafeDeploymentRepository {
    async fn create(
        &self,
        intent: SafeDeploymentIntent,
    ) -> Result<SafeDeploymentIntent, RepositoryError> {
        let json = self.serialize_entity(&intent, |i| i.safe.to_string(), ENTITY)?;
        let mut conn = self.client.as_ref().clone();

        let created: bool = conn
            .set_nx(self.intent_key(intent.safe), json)
            .await
            .map_err(|e| self.map_redis_error(e, "create_safe_deployment"))?;
        if !created {
            return Err(RepositoryError::ConstraintViolation(format!(
                "Safe deployment {} already exists",
                intent.safe
            )));
        }

        redis::pipe()
            .atomic()
            .set(
                self.owners_key(&intent.owners, intent.salt_nonce),
                intent.safe.to_string(),
            )
            .ignore()
            .sadd(self.unconfirmed_key(), intent.safe.to_string())
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| self.map_redis_error(e, "index_safe_deployment"))?;

        debug!(safe = %intent.safe, salt_nonce = %intent.salt_nonce, "safe deployment intent stored");
        Ok(intent)
    }

    async fn get_by_address(&self, safe: Address) -> Result<SafeDeploymentIntent, RepositoryError> {
        self.find(safe)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("Safe deployment {safe} not found")))
    }

    async fn get_by_owners_and_salt(
        &self,
        owners: Vec<Address>,
        salt_nonce: U256,
    ) -> Result<Option<SafeDeploymentIntent>, RepositoryError> {
        let mut conn = self.client.as_ref().clone();
        let safe: Option<String> = conn
            .get(self.owners_key(&owners, salt_nonce))
            .await
            .map_err(|e| self.map_redis_error(e, "get_safe_by_owners"))?;

        match safe {
            Some(safe) => {
                let safe: Address = safe.parse().map_err(|e| {
                    RepositoryError::InvalidData(format!("Invalid safe address {safe} in index: {e}"))
                })?;
                self.find(safe).await
            }
            None => Ok(None),
        }
    }

    async fn list_pending_deploy(&self) -> Result<Vec<SafeDeploymentIntent>, RepositoryError> {
        let intents = self.list_unconfirmed_set().await?;
        Ok(intents
            .into_iter()
            .filter(|intent| !intent.is_submitted())
            .collect())
    }

    async fn list_unconfirmed(&self) -> Result<Vec<SafeDeploymentIntent>, RepositoryError> {
        let intents = self.list_unconfirmed_set().await?;
        Ok(intents
            .into_iter()
            .filter(|intent| intent.is_submitted() && !intent.is_confirmed())
            .collect())
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
