//! Redis implementation of the nonce counter.
//!
//! Counters live under `{prefix}:nonce:{address}` and rely on INCR and EXPIRE
//! for atomicity across relay processes.
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use super::NonceCounterTrait;
use crate::constants::NONCE_KEY;
use crate::models::RepositoryError;
use crate::repositories::redis_base::RedisRepository;

#[derive(Clone)]
pub struct RedisNonceCounter {
    pub client: Arc<ConnectionManager>,
    pub key_prefix: String,
}

impl RedisRepository for RedisNonceCounter {
    fn key_prefix(&self) -> &str {
        &self.key_prefix
    }
}

impl fmt::Debug for RedisNonceCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisNonceCounter")
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

impl RedisNonceCounter {
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

    fn counter_key(&self, address: Address) -> String {
        self.entity_key(NONCE_KEY, &address.to_string())
    }
}

#[async_trait]
impl NonceCounterTrait for RedisNonceCounter {
    async fn get(&self, address: Address) -> Result<Option<u64>, RepositoryError> {
        let key = self.counter_key(address);
        let mut conn = self.client.as_ref().clone();

        let value: Option<u64> = conn
            .get(&key)
            .await
            .map_err(|e| self.map_redis_error(e, "get_nonce_counter"))?;
        Ok(value)
    }

    async fn increment(&self, address: Address) -> Result<u64, RepositoryError> {
        let key = self.counter_key(address);
        let mut conn = self.client.as_ref().clone();

        let value: u64 = conn
            .incr(&key, 1)
            .await
            .map_err(|e| self.map_redis_error(e, "increment_nonce_counter"))?;

        debug!(address = %address, value, "nonce counter incremented");
        Ok(value)
    }

    async fn set(&self, address: Address, value: u64) -> Result<(), RepositoryError> {
        let key = self.counter_key(address);
        let mut conn = self.client.as_ref().clone();

        let _: () = conn
            .set(&key, value)
            .await
            .map_err(|e| self.map_redis_error(e, "set_nonce_counter"))?;

        debug!(address = %address, value, "nonce counter set");
        Ok(())
    }

    async fn delete(&self, address: Address) -> Result<(), RepositoryError> {
        let key = self.counter_key(address);
        let mut conn = self.client.as_ref().clone();

        let _: () = conn
            .del(&key)
            .await
            .map_err(|e| self.map_redis_error(e, "delete_nonce_counter"))?;
        Ok(())
    }

    async fn expire(&self, address: Address, ttl: Duration) -> Result<(), RepositoryError> {
        let key = self.counter_key(address);
        let mut conn = self.client.as_ref().clone();

        let _: () = conn
            .expire(&key, ttl.as_secs() as i64)
            .await
            .map_err(|e| self.map_redis_error(e, "expire_nonce_counter"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::tests_support::{random_address, redis_connection};

    async fn setup_test_repo() -> RedisNonceCounter {
        RedisNonceCounter::new(redis_connection().await, "test_nonce".to_string())
            .expect("Failed to create Redis nonce counter")
    }

    #[tokio::test]
    #[ignore = "Requires active Redis instance"]
    async fn test_increment_set_and_delete() {
        let repo = setup_test_repo().await;
        let address = random_address();

        assert_eq!(repo.get(address).await.unwrap(), None);
        assert_eq!(repo.increment(address).await.unwrap(), 1);

        repo.set(address, 20).await.unwrap();
        assert_eq!(repo.increment(address).await.unwrap(), 21);

        repo.expire(address, Duration::from_secs(60)).await.unwrap();
        assert_eq!(repo.get(address).await.unwrap(), Some(21));

        repo.delete(address).await.unwrap();
        assert_eq!(repo.get(address).await.unwrap(), None);
    }
}
