//! Redis storage of relayed multisig transactions.
//!
//! `{prefix}:multisig_tx:{safe}:{nonce}` holds the JSON entity and is written
//! with SET NX; `{prefix}:multisig_tx_nonces:{safe}` is a sorted set of the
//! relayed nonces.
use std::fmt;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use super::MultisigTxRepositoryTrait;
use crate::constants::{MULTISIG_TX_KEY, MULTISIG_TX_NONCES_KEY};
use crate::models::{RelayedMultisigTransaction, RepositoryError};
use crate::repositories::redis_base::RedisRepository;

#[derive(Clone)]
pub struct RedisMultisigTxRepository {
    pub client: Arc<ConnectionManager>,
    pub key_prefix: String,
}

impl RedisRepository for RedisMultisigTxRepository {
    fn key_prefix(&self) -> &str {
        &self.key_prefix
    }
}

impl fmt::Debug for RedisMultisigTxRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisMultisigTxRepository")
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

impl RedisMultisigTxRepository {
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

    fn tx_key(&self, safe: Address, nonce: U256) -> String {
        self.entity_key(MULTISIG_TX_KEY, &format!("{safe}:{nonce}"))
    }

    fn nonces_key(&self, safe: Address) -> String {
        self.entity_key(MULTISIG_TX_NONCES_KEY, &safe.to_string())
    }
}

#[async_trait]
impl MultisigTxRepositoryTrait for RedisMultisigTxRepository {
    async fn exists(&self, safe: Address, nonce: U256) -> Result<bool, RepositoryError> {
        let mut conn = self.client.as_ref().clone();
        conn.exists(self.tx_key(safe, nonce))
            .await
            .map_err(|e| self.map_redis_error(e, "multisig_tx_exists"))
    }

    async fn create(
        &self,
        tx: RelayedMultisigTransaction,
    ) -> Result<RelayedMultisigTransaction, RepositoryError> {
        let id = format!("{}:{}", tx.safe, tx.nonce);
        let json = self.serialize_entity(&tx, |_| id.clone(), "RelayedMultisigTransaction")?;
        let mut conn = self.client.as_ref().clone();

        let created: bool = conn
            .set_nx(self.tx_key(tx.safe, tx.nonce), json)
            .await
            .map_err(|e| self.map_redis_error(e, "create_multisig_tx"))?;
        if !created {
            return Err(RepositoryError::ConstraintViolation(format!(
                "Multisig tx for safe {} with nonce {} already exists",
                tx.safe, tx.nonce
            )));
        }

        // Scores lose precision past 2^53; the member keeps the exact nonce
        let score = tx.nonce.saturating_to::<u64>() as f64;
        let _: () = conn
            .zadd(self.nonces_key(tx.safe), tx.nonce.to_string(), score)
            .await
            .map_err(|e| self.map_redis_error(e, "index_multisig_tx_nonce"))?;

        debug!(safe = %tx.safe, nonce = %tx.nonce, tx_hash = %tx.tx_hash, "multisig tx stored");
        Ok(tx)
    }

    async fn get(
        &self,
        safe: Address,
        nonce: U256,
    ) -> Result<RelayedMultisigTransaction, RepositoryError> {
        let mut conn = self.client.as_ref().clone();
        let json: Option<String> = conn
            .get(self.tx_key(safe, nonce))
            .await
            .map_err(|e| self.map_redis_error(e, "get_multisig_tx"))?;

        match json {
            Some(json) => self.deserialize_entity(
                &json,
                &format!("{safe}:{nonce}"),
                "RelayedMultisigTransaction",
            ),
            None => Err(RepositoryError::NotFound(format!(
                "Multisig tx for safe {safe} with nonce {nonce} not found"
            ))),
        }
    }

    async fn get_last_nonce(&self, safe: Address) -> Result<Option<U256>, RepositoryError> {
        let mut conn = self.client.as_ref().clone();
        let members: Vec<String> = conn
            .zrevrange(self.nonces_key(safe), 0, 0)
            .await
            .map_err(|e| self.map_redis_error(e, "get_last_multisig_nonce"))?;

        members
            .first()
            .map(|nonce| {
                nonce.parse::<U256>().map_err(|e| {
                    RepositoryError::InvalidData(format!("Invalid nonce {nonce} stored: {e}"))
                })
            })
            .transpose()
    }
}
