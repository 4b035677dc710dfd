//! Token Repository Module
//!
//! ERC-20 tokens known to the relay. Only tokens flagged `gas` are accepted
//! as payment for Safe creations and as gas token of relayed transactions.

mod token_in_memory;
mod token_redis;

pub use token_in_memory::InMemoryTokenRepository;
pub use token_redis::RedisTokenRepository;

use alloy::primitives::Address;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use crate::models::{RepositoryError, Token};

#[async_trait]
#[cfg_attr(test, automock)]
pub trait TokenRepositoryTrait: Send + Sync {
    /// Fails with `NotFound` for unknown tokens.
    async fn get(&self, address: Address) -> Result<Token, RepositoryError>;

    /// The token when it is registered and accepted as gas token.
    async fn get_gas_token(&self, address: Address) -> Result<Option<Token>, RepositoryError>;

    async fn list_gas_tokens(&self) -> Result<Vec<Token>, RepositoryError>;

    async fn upsert(&self, token: Token) -> Result<Token, RepositoryError>;
}

#[derive(Debug, Clone)]
pub enum TokenRepositoryStorage {
    InMemory(InMemoryTokenRepository),
    Redis(RedisTokenRepository),
}

impl TokenRepositoryStorage {
    pub fn new_in_memory() -> Self {
        Self::InMemory(InMemoryTokenRepository::new())
    }

    pub fn new_redis(
        connection_manager: Arc<ConnectionManager>,
        key_prefix: String,
    ) -> Result<Self, RepositoryError> {
        Ok(Self::Redis(RedisTokenRepository::new(
            connection_manager,
            key_prefix,
        )?))
    }
}

#[async_trait]
impl TokenRepositoryTrait for TokenRepositoryStorage {
    async fn get(&self, address: Address) -> Result<Token, RepositoryError> {
        match self {
            Self::InMemory(repo) => repo.get(address).await,
            Self::Redis(repo) => repo.get(address).await,
        }
    }

    async fn get_gas_token(&self, address: Address) -> Result<Option<Token>, RepositoryError> {
        match self {
            Self::InMemory(repo) => repo.get_gas_token(address).await,
            Self::Redis(repo) => repo.get_gas_token(address).await,
        }
    }

    async fn list_gas_tokens(&self) -> Result<Vec<Token>, RepositoryError> {
        match self {
            Self::InMemory(repo) => repo.list_gas_tokens().await,
            Self::Redis(repo) => repo.list_gas_tokens().await,
        }
    }

    async fn upsert(&self, token: Token) -> Result<Token, RepositoryError> {
        match self {
            Self::InMemory(repo) => repo.upsert(token).await,
            Self::Redis(repo) => repo.upsert(token).await,
        }
    }
}

#[cfg(test)]
pub(crate) fn create_test_token(address: Address, gas: bool) -> Token {
    Token {
        address,
        name: "Test Token".to_string(),
        symbol: "TST".to_string(),
        decimals: 18,
        fixed_eth_conversion: Some(0.5),
        gas,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enum_wrapper_delegation() {
        let repo = TokenRepositoryStorage::new_in_memory();
        let gas_token = create_test_token(Address::repeat_byte(1), true);
        let other = create_test_token(Address::repeat_byte(2), false);

        repo.upsert(gas_token.clone()).await.unwrap();
        repo.upsert(other.clone()).await.unwrap();

        assert_eq!(repo.get(other.address).await.unwrap(), other);
        assert_eq!(repo.list_gas_tokens().await.unwrap(), vec![gas_token]);
    }
}
