//! Redis storage of legacy creations and their funding records.
//!
//! Keys:
//! - `{prefix}:legacy_creation:{safe}` JSON creation, written with SET NX
//! - `{prefix}:legacy_funding:{safe}` JSON funding record
//! - `{prefix}:legacy_funding_safes` set of Safes not deployed yet
use std::fmt;
use std::sync::Arc;

use alloy::primitives::Address;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use super::{is_pending_deploy, is_pending_funding, LegacyFundingRepositoryTrait};
use crate::constants::{LEGACY_CREATION_KEY, LEGACY_FUNDING_INDEX_KEY, LEGACY_FUNDING_KEY};
use crate::models::{
    LegacyFundingRecord, LegacyFundingUpdate, LegacySafeCreation, RepositoryError,
};
use crate::repositories::redis_base::RedisRepository;

#[derive(Clone)]
pub struct RedisLegacyFundingRepository {
    pub client: Arc<ConnectionManager>,
    pub key_prefix: String,
}

impl RedisRepository for RedisLegacyFundingRepository {
    fn key_prefix(&self) -> &str {
        &self.key_prefix
    }
}

impl fmt::Debug for RedisLegacyFundingRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisLegacyFundingRepository")
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

impl RedisLegacyFundingRepository {
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

    fn creation_key(&self, safe: Address) -> String {
        self.entity_key(LEGACY_CREATION_KEY, &safe.to_string())
    }

    fn funding_key(&self, safe: Address) -> String {
        self.entity_key(LEGACY_FUNDING_KEY, &safe.to_string())
    }

    fn index_key(&self) -> String {
        format!("{}:{}", self.key_prefix, LEGACY_FUNDING_INDEX_KEY)
    }

    async fn find_funding(
        &self,
        safe: Address,
    ) -> Result<Option<LegacyFundingRecord>, RepositoryError> {
        let mut conn = self.client.as_ref().clone();
        let json: Option<String> = conn
            .get(self.funding_key(safe))
            .await
            .map_err(|e| self.map_redis_error(e, "get_legacy_funding"))?;
        json.map(|json| self.deserialize_entity(&json, &safe.to_string(), "LegacyFundingRecord"))
            .transpose()
    }

    async fn store_funding(&self, record: &LegacyFundingRecord) -> Result<(), RepositoryError> {
        let json = self.serialize_entity(record, |r| r.safe.to_string(), "LegacyFundingRecord")?;
        let mut conn = self.client.as_ref().clone();
        let mut pipe = redis::pipe();
        pipe.atomic().set(self.funding_key(record.safe), json).ignore();
        if record.safe_deployed {
            pipe.srem(self.index_key(), record.safe.to_string()).ignore();
        } else {
            pipe.sadd(self.index_key(), record.safe.to_string()).ignore();
        }
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(|e| self.map_redis_error(e, "store_legacy_funding"))
    }

    async fn list_indexed(&self) -> Result<Vec<LegacyFundingRecord>, RepositoryError> {
        let mut conn = self.client.as_ref().clone();
        let members: Vec<String> = conn
            .smembers(self.index_key())
            .await
            .map_err(|e| self.map_redis_error(e, "list_legacy_fundings"))?;
        if members.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = members
            .iter()
            .map(|member| self.entity_key(LEGACY_FUNDING_KEY, member))
            .collect();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.map_redis_error(e, "list_legacy_fundings_mget"))?;

        let mut records = Vec::with_capacity(values.len());
        for (member, json) in members.iter().zip(values) {
            if let Some(json) = json {
                records.push(self.deserialize_entity::<LegacyFundingRecord>(
                    &json,
                    member,
                    "LegacyFundingRecord",
                )?);
            }
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.safe.cmp(&b.safe)));
        Ok(records)
    }
}

#[async_trait]
impl LegacyFundingRepositoryTrait for RedisLegacyFundingRepository {
    async fn create_creation(
        &self,
        creation: LegacySafeCreation,
    ) -> Result<LegacySafeCreation, RepositoryError> {
        let json = self.serialize_entity(&creation, |c| c.safe.to_string(), "LegacySafeCreation")?;
        let mut conn = self.client.as_ref().clone();

        let created: bool = conn
            .set_nx(self.creation_key(creation.safe), json)
            .await
            .map_err(|e| self.map_redis_error(e, "create_legacy_creation"))?;
        if !created {
            return Err(RepositoryError::ConstraintViolation(format!(
                "Legacy creation for safe {} already exists",
                creation.safe
            )));
        }

        self.get_or_create_funding(creation.safe).await?;
        debug!(safe = %creation.safe, deployer = %creation.deployer, "legacy creation stored");
        Ok(creation)
    }

    async fn get_creation(&self, safe: Address) -> Result<LegacySafeCreation, RepositoryError> {
        let mut conn = self.client.as_ref().clone();
        let json: Option<String> = conn
            .get(self.creation_key(safe))
            .await
            .map_err(|e| self.map_redis_error(e, "get_legacy_creation"))?;
        match json {
            Some(json) => self.deserialize_entity(&json, &safe.to_string(), "LegacySafeCreation"),
            None => Err(RepositoryError::NotFound(format!(
                "Legacy creation {safe} not found"
            ))),
        }
    }

    async fn get_or_create_funding(
        &self,
        safe: Address,
    ) -> Result<LegacyFundingRecord, RepositoryError> {
        let record = LegacyFundingRecord::new(safe);
        let json = self.serialize_entity(&record, |r| r.safe.to_string(), "LegacyFundingRecord")?;
        let mut conn = self.client.as_ref().clone();

        let created: bool = conn
            .set_nx(self.funding_key(safe), json)
            .await
            .map_err(|e| self.map_redis_error(e, "create_legacy_funding"))?;
        if created {
            let _: () = conn
                .sadd(self.index_key(), safe.to_string())
                .await
                .map_err(|e| self.map_redis_error(e, "index_legacy_funding"))?;
            return Ok(record);
        }
        self.get_funding(safe).await
    }

    async fn get_funding(&self, safe: Address) -> Result<LegacyFundingRecord, RepositoryError> {
        self.find_funding(safe)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("Safe funding {safe} not found")))
    }

    async fn update_funding(
        &self,
        safe: Address,
        update: LegacyFundingUpdate,
    ) -> Result<LegacyFundingRecord, RepositoryError> {
        let mut record = self.get_funding(safe).await?;
        update.apply(&mut record);
        self.store_funding(&record).await?;
        Ok(record)
    }

    async fn list_pending_funding(&self) -> Result<Vec<LegacyFundingRecord>, RepositoryError> {
        Ok(self
            .list_indexed()
            .await?
            .into_iter()
            .filter(is_pending_funding)
            .collect())
    }

    async fn list_pending_deploy(&self) -> Result<Vec<LegacyFundingRecord>, RepositoryError> {
        Ok(self
            .list_indexed()
            .await?
            .into_iter()
            .filter(is_pending_deploy)
            .collect())
    }
}
