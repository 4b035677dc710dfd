use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::Address;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::TokenRepositoryTrait;
use crate::models::{RepositoryError, Token};

#[derive(Debug, Clone, Default)]
pub struct InMemoryTokenRepository {
    store: Arc<Mutex<HashMap<Address, Token>>>,
}

impl InMemoryTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenRepositoryTrait for InMemoryTokenRepository {
    async fn get(&self, address: Address) -> Result<Token, RepositoryError> {
        self.store
            .lock()
            .await
            .get(&address)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("Token {address} not found")))
    }

    async fn get_gas_token(&self, address: Address) -> Result<Option<Token>, RepositoryError> {
        let store = self.store.lock().await;
        Ok(store.get(&address).filter(|token| token.gas).cloned())
    }

    async fn list_gas_tokens(&self) -> Result<Vec<Token>, RepositoryError> {
        let store = self.store.lock().await;
        let mut tokens: Vec<Token> = store.values().filter(|token| token.gas).cloned().collect();
        tokens.sort_by_key(|token| token.address);
        Ok(tokens)
    }

    async fn upsert(&self, token: Token) -> Result<Token, RepositoryError> {
        self.store.lock().await.insert(token.address, token.clone());
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::token::create_test_token;

    #[tokio::test]
    async fn test_get_unknown_token() {
        let repo = InMemoryTokenRepository::new();
        assert!(matches!(
            repo.get(Address::repeat_byte(9)).await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_get_gas_token_filters_non_gas_tokens() {
        let repo = InMemoryTokenRepository::new();
        repo.upsert(create_test_token(Address::repeat_byte(1), false))
            .await
            .unwrap();
        assert_eq!(repo.get_gas_token(Address::repeat_byte(1)).await.unwrap(), None);

        repo.upsert(create_test_token(Address::repeat_byte(1), true))
            .await
            .unwrap();
        assert!(repo
            .get_gas_token(Address::repeat_byte(1))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_list_gas_tokens_sorted() {
        let repo = InMemoryTokenRepository::new();
        for byte in [3u8, 1, 2] {
            repo.upsert(create_test_token(Address::repeat_byte(byte), true))
                .await
                .unwrap();
        }
        let addresses: Vec<Address> = repo
            .list_gas_tokens()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.address)
            .collect();
        assert_eq!(
            addresses,
            vec![
                Address::repeat_byte(1),
                Address::repeat_byte(2),
                Address::repeat_byte(3)
            ]
        );
    }
}
