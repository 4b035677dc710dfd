//! # Nonce Lock
//!
//! Serializes transaction sending per sender address. Inside the lock a
//! nonce is allocated from a short lived counter:
//!
//! 1. INCR the counter of the address
//! 2. a result of 1 means the counter was absent: reseed it from the
//!    pending transaction count of the chain
//! 3. refresh the counter TTL
//!
//! When the operation fails the counter is dropped so the next allocation
//! reseeds from the chain instead of leaving a gap.
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use tracing::{debug, warn};

use crate::constants::{
    LOCKS_KEY, NONCE_KEY_TIMEOUT_SECS, NONCE_LOCK_TTL_SECS, NONCE_LOCK_WAIT_TIMEOUT_SECS,
};
use crate::models::NonceLockError;
use crate::repositories::{NonceCounterRepositoryStorage, NonceCounterTrait};
use crate::services::EvmProviderTrait;
use crate::utils::{LockGuard, LockManager};

pub struct NonceLockService<P: EvmProviderTrait> {
    provider: Arc<P>,
    counter: Arc<NonceCounterRepositoryStorage>,
    lock_manager: LockManager,
    lock_ttl: Duration,
    wait_timeout: Duration,
    counter_ttl: Duration,
}

impl<P: EvmProviderTrait> NonceLockService<P> {
    pub fn new(
        provider: Arc<P>,
        counter: Arc<NonceCounterRepositoryStorage>,
        lock_manager: LockManager,
    ) -> Self {
        Self {
            provider,
            counter,
            lock_manager,
            lock_ttl: Duration::from_secs(NONCE_LOCK_TTL_SECS),
            wait_timeout: Duration::from_secs(NONCE_LOCK_WAIT_TIMEOUT_SECS),
            counter_ttl: Duration::from_secs(NONCE_KEY_TIMEOUT_SECS),
        }
    }

    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    async fn acquire(&self, address: Address) -> Result<LockGuard, NonceLockError> {
        let name = format!("{LOCKS_KEY}:{address}");
        self.lock_manager
            .lock(&name, self.lock_ttl, self.wait_timeout)
            .await?
            .ok_or(NonceLockError::Timeout(address))
    }

    async fn allocate(&self, address: Address) -> Result<u64, NonceLockError> {
        let counted = self.counter.increment(address).await?;
        let nonce = if counted == 1 {
            let pending = self.provider.get_transaction_count(address).await?;
            self.counter.set(address, pending).await?;
            debug!(address = %address, nonce = pending, "nonce counter seeded from chain");
            pending
        } else {
            counted
        };
        self.counter.expire(address, self.counter_ttl).await?;
        Ok(nonce)
    }

    async fn reset(&self, address: Address) {
        if let Err(e) = self.counter.delete(address).await {
            warn!(address = %address, error = %e, "failed to reset nonce counter");
        }
    }

    /// Runs `operation` with the next nonce of `address` while holding its lock.
    ///
    /// An error from `operation` resets the counter, so its nonce is
    /// handed out again.
    pub async fn with_nonce<T, E, F, Fut>(&self, address: Address, operation: F) -> Result<T, E>
    where
        E: From<NonceLockError>,
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let guard = self.acquire(address).await.map_err(E::from)?;

        let result = match self.allocate(address).await {
            Ok(nonce) => {
                let result = operation(nonce).await;
                if result.is_err() {
                    warn!(address = %address, nonce, "operation failed, resetting nonce counter");
                    self.reset(address).await;
                }
                result
            }
            Err(e) => {
                self.reset(address).await;
                Err(E::from(e))
            }
        };

        guard.release().await;
        result
    }

    /// Runs `operation` holding the lock of `address` without allocating a
    /// nonce. Used to replace a pending tx with the nonce it already has.
    pub async fn with_held_lock<T, E, F, Fut>(
        &self,
        address: Address,
        operation: F,
    ) -> Result<T, E>
    where
        E: From<NonceLockError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let guard = self.acquire(address).await.map_err(E::from)?;
        let result = operation().await;
        guard.release().await;
        result
    }
}
