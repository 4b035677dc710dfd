//! Nonce Counter Repository Module
//!
//! Short lived per-address counters the nonce lock allocates transaction
//! nonces from. A counter that is absent (never set, expired or deleted)
//! forces the next allocation to reseed from the chain.
//!
//! - [`InMemoryNonceCounter`]: DashMap backed, for single process deployments
//! - [`RedisNonceCounter`]: shared between relay processes

mod nonce_counter_in_memory;
mod nonce_counter_redis;

pub use nonce_counter_in_memory::InMemoryNonceCounter;
pub use nonce_counter_redis::RedisNonceCounter;

use alloy::primitives::Address;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

use crate::models::RepositoryError;

#[async_trait]
#[cfg_attr(test, automock)]
pub trait NonceCounterTrait: Send + Sync {
    async fn get(&self, address: Address) -> Result<Option<u64>, RepositoryError>;

    /// Atomically increments the counter, starting from 0 when absent, and
    /// returns the new value.
    async fn increment(&self, address: Address) -> Result<u64, RepositoryError>;

    async fn set(&self, address: Address, value: u64) -> Result<(), RepositoryError>;

    async fn delete(&self, address: Address) -> Result<(), RepositoryError>;

    /// Drops the counter once `ttl` elapses without another `expire`.
    async fn expire(&self, address: Address, ttl: Duration) -> Result<(), RepositoryError>;
}

/// Enum wrapper for the nonce counter implementations
#[derive(Debug, Clone)]
pub enum NonceCounterRepositoryStorage {
    InMemory(InMemoryNonceCounter),
    Redis(RedisNonceCounter),
}

impl NonceCounterRepositoryStorage {
    pub fn new_in_memory() -> Self {
        Self::InMemory(InMemoryNonceCounter::new())
    }

    pub fn new_redis(
        connection_manager: Arc<ConnectionManager>,
        key_prefix: String,
    ) -> Result<Self, RepositoryError> {
        Ok(Self::Redis(RedisNonceCounter::new(
            connection_manager,
            key_prefix,
        )?))
    }
}

#[async_trait]
impl NonceCounterTrait for NonceCounterRepositoryStorage {
    async fn get(&self, address: Address) -> Result<Option<u64>, RepositoryError> {
        match self {
            Self::InMemory(counter) => counter.get(address).await,
            Self::Redis(counter) => counter.get(address).await,
        }
    }

    async fn increment(&self, address: Address) -> Result<u64, RepositoryError> {
        match self {
            Self::InMemory(counter) => counter.increment(address).await,
            Self::Redis(counter) => counter.increment(address).await,
        }
    }

    async fn set(&self, address: Address, value: u64) -> Result<(), RepositoryError> {
        match self {
            Self::InMemory(counter) => counter.set(address, value).await,
            Self::Redis(counter) => counter.set(address, value).await,
        }
    }

    async fn delete(&self, address: Address) -> Result<(), RepositoryError> {
        match self {
            Self::InMemory(counter) => counter.delete(address).await,
            Self::Redis(counter) => counter.delete(address).await,
        }
    }

    async fn expire(&self, address: Address, ttl: Duration) -> Result<(), RepositoryError> {
        match self {
            Self::InMemory(counter) => counter.expire(address, ttl).await,
            Self::Redis(counter) => counter.expire(address, ttl).await,
        }
    }
}
