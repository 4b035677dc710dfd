//! Redis token registry: `{prefix}:token:{address}` holds the JSON entity and
//! the `{prefix}:tokens` set lists every registered address.
use std::fmt;
use std::sync::Arc;

use alloy::primitives::Address;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use super::TokenRepositoryTrait;
use crate::constants::{TOKEN_INDEX_KEY, TOKEN_KEY};
use crate::models::{RepositoryError, Token};
use crate::repositories::redis_base::RedisRepository;

#[derive(Clone)]
pub struct RedisTokenRepository {
    pub client: Arc<ConnectionManager>,
    pub key_prefix: String,
}

impl RedisRepository for RedisTokenRepository {
    fn key_prefix(&self) -> &str {
        &self.key_prefix
    }
}

impl fmt::Debug for RedisTokenRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisTokenRepository")
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

impl RedisTokenRepository {
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

    fn token_key(&self, address: Address) -> String {
        self.entity_key(TOKEN_KEY, &address.to_string())
    }

    fn index_key(&self) -> String {
        format!("{}:{}", self.key_prefix, TOKEN_INDEX_KEY)
    }

    async fn find(&self, address: Address) -> Result<Option<Token>, RepositoryError> {
        let mut conn = self.client.as_ref().clone();
        let json: Option<String> = conn
            .get(self.token_key(address))
            .await
            .map_err(|e| self.map_redis_error(e, "get_token"))?;
        json.map(|json| self.deserialize_entity(&json, &address.to_string(), "Token"))
            .transpose()
    }
}

#[async_trait]
impl TokenRepositoryTrait for RedisTokenRepository {
    async fn get(&self, address: Address) -> Result<Token, RepositoryError> {
        self.find(address)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("Token {address} not found")))
    }

    async fn get_gas_token(&self, address: Address) -> Result<Option<Token>, RepositoryError> {
        Ok(self.find(address).await?.filter(|token| token.gas))
    }

    async fn list_gas_tokens(&self) -> Result<Vec<Token>, RepositoryError> {
        let mut conn = self.client.as_ref().clone();
        let members: Vec<String> = conn
            .smembers(self.index_key())
            .await
            .map_err(|e| self.map_redis_error(e, "list_tokens"))?;
        if members.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = members
            .iter()
            .map(|member| self.entity_key(TOKEN_KEY, member))
            .collect();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.map_redis_error(e, "list_tokens_mget"))?;

        let mut tokens = Vec::new();
        for (member, json) in members.iter().zip(values) {
            if let Some(json) = json {
                let token: Token = self.deserialize_entity(&json, member, "Token")?;
                if token.gas {
                    tokens.push(token);
                }
            }
        }
        tokens.sort_by_key(|token| token.address);
        Ok(tokens)
    }

    async fn upsert(&self, token: Token) -> Result<Token, RepositoryError> {
        let json = self.serialize_entity(&token, |t| t.address.to_string(), "Token")?;
        let mut conn = self.client.as_ref().clone();
        redis::pipe()
            .atomic()
            .set(self.token_key(token.address), json)
            .ignore()
            .sadd(self.index_key(), token.address.to_string())
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| self.map_redis_error(e, "upsert_token"))?;

        debug!(token = %token.address, symbol = %token.symbol, "token stored");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::tests_support::{random_address, redis_connection};
    use crate::repositories::token::create_test_token;

    async fn setup_test_repo() -> RedisTokenRepository {
        let prefix = format!("test_token_{}", uuid::Uuid::new_v4());
        RedisTokenRepository::new(redis_connection().await, prefix).unwrap()
    }

    #[tokio::test]
    #[ignore = "Requires active Redis instance"]
    async fn test_upsert_and_get() {
        let repo = setup_test_repo().await;
        let token = create_test_token(random_address(), true);

        repo.upsert(token.clone()).await.unwrap();
        assert_eq!(repo.get(token.address).await.unwrap(), token);
        assert_eq!(
            repo.get_gas_token(token.address).await.unwrap(),
            Some(token.clone())
        );
        assert_eq!(repo.list_gas_tokens().await.unwrap(), vec![token]);
    }

    #[tokio::test]
    #[ignore = "Requires active Redis instance"]
    async fn test_get_missing_token() {
        let repo = setup_test_repo().await;
        assert!(matches!(
            repo.get(random_address()).await,
            Err(RepositoryError::NotFound(_))
        ));
    }
}
