//! In-memory nonce counters with expiry.
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use super::NonceCounterTrait;
use crate::models::RepositoryError;

#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    value: u64,
    expires_at: Option<Instant>,
}

impl CounterEntry {
    fn is_live(&self) -> bool {
        self.expires_at.is_none_or(|at| Instant::now() < at)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryNonceCounter {
    store: Arc<DashMap<Address, CounterEntry>>,
}

impl InMemoryNonceCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NonceCounterTrait for InMemoryNonceCounter {
    async fn get(&self, address: Address) -> Result<Option<u64>, RepositoryError> {
        Ok(self
            .store
            .get(&address)
            .filter(|entry| entry.is_live())
            .map(|entry| entry.value))
    }

    async fn increment(&self, address: Address) -> Result<u64, RepositoryError> {
        let mut entry = self.store.entry(address).or_insert(CounterEntry {
            value: 0,
            expires_at: None,
        });
        if !entry.is_live() {
            *entry = CounterEntry {
                value: 0,
                expires_at: None,
            };
        }
        entry.value += 1;
        Ok(entry.value)
    }

    async fn set(&self, address: Address, value: u64) -> Result<(), RepositoryError> {
        // Like SET, this clears any expiry
        self.store.insert(
            address,
            CounterEntry {
                value,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn delete(&self, address: Address) -> Result<(), RepositoryError> {
        self.store.remove(&address);
        Ok(())
    }

    async fn expire(&self, address: Address, ttl: Duration) -> Result<(), RepositoryError> {
        if let Some(mut entry) = self.store.get_mut(&address) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_increment_starts_at_one() {
        let counter = InMemoryNonceCounter::new();
        let address = Address::repeat_byte(1);
        assert_eq!(counter.increment(address).await.unwrap(), 1);
        assert_eq!(counter.increment(address).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_counters_are_per_address() {
        let counter = InMemoryNonceCounter::new();
        counter.set(Address::repeat_byte(1), 10).await.unwrap();
        assert_eq!(counter.get(Address::repeat_byte(2)).await.unwrap(), None);
        assert_eq!(counter.increment(Address::repeat_byte(2)).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_counter_is_absent() {
        let counter = InMemoryNonceCounter::new();
        let address = Address::repeat_byte(1);
        counter.set(address, 7).await.unwrap();
        counter.expire(address, Duration::from_secs(60)).await.unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(counter.get(address).await.unwrap(), Some(7));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(counter.get(address).await.unwrap(), None);
        assert_eq!(counter.increment(address).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let counter = InMemoryNonceCounter::new();
        let clone = counter.clone();
        counter.set(Address::repeat_byte(1), 3).await.unwrap();
        assert_eq!(clone.get(Address::repeat_byte(1)).await.unwrap(), Some(3));
    }
}
