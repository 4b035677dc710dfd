//! # Transaction Sender
//!
//! Signs and broadcasts the relay's own legacy transactions for one key. A
//! new transaction takes its nonce from the [`NonceLockService`]; a
//! replacement reuses the nonce of the tx it replaces while holding the
//! same lock.
use std::sync::Arc;

use alloy::{
    consensus::TxLegacy,
    primitives::{Address, Bytes, TxKind, B256, U256},
};
use tracing::info;

use crate::models::SafeRelayError;
use crate::services::{EvmProviderTrait, LocalSigner, NonceLockService};

/// Fields of an outgoing transaction, the nonce aside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionParams {
    pub to: TxKind,
    pub value: U256,
    pub input: Bytes,
    pub gas_limit: u64,
    pub gas_price: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentTransaction {
    pub hash: B256,
    pub nonce: u64,
    pub gas_price: u128,
}

pub struct TransactionSender<P: EvmProviderTrait> {
    provider: Arc<P>,
    signer: LocalSigner,
    chain_id: u64,
    nonce_lock: Arc<NonceLockService<P>>,
}

impl<P: EvmProviderTrait> TransactionSender<P> {
    pub fn new(
        provider: Arc<P>,
        signer: LocalSigner,
        chain_id: u64,
        nonce_lock: Arc<NonceLockService<P>>,
    ) -> Self {
        Self {
            provider,
            signer,
            chain_id,
            nonce_lock,
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    async fn sign_and_broadcast(
        &self,
        params: TransactionParams,
        nonce: u64,
    ) -> Result<SentTransaction, SafeRelayError> {
        let tx = TxLegacy {
            chain_id: Some(self.chain_id),
            nonce,
            gas_price: params.gas_price,
            gas_limit: params.gas_limit,
            to: params.to,
            value: params.value,
            input: params.input,
        };
        let signed = self.signer.sign_transaction(tx)?;
        let hash = self.provider.send_raw_transaction(&signed.raw).await?;
        info!(
            sender = %self.address(),
            tx_hash = %hash,
            nonce,
            gas_price = params.gas_price,
            "transaction sent"
        );
        Ok(SentTransaction {
            hash,
            nonce,
            gas_price: params.gas_price,
        })
    }

    /// Sends a transaction with the next nonce of the key.
    pub async fn send(&self, params: TransactionParams) -> Result<SentTransaction, SafeRelayError> {
        self.nonce_lock
            .with_nonce(self.address(), |nonce| self.sign_and_broadcast(params, nonce))
            .await
    }

    /// Replaces a pending transaction, keeping its nonce.
    pub async fn replace(
        &self,
        nonce: u64,
        params: TransactionParams,
    ) -> Result<SentTransaction, SafeRelayError> {
        self.nonce_lock
            .with_held_lock(self.address(), || self.sign_and_broadcast(params, nonce))
            .await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::SecretKey;
    use crate::repositories::NonceCounterRepositoryStorage;
    use crate::utils::LockManager;

    pub const TEST_SENDER_KEY: &str =
        "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    pub fn sender_with_lock(
        provider: Arc<crate::services::MockEvmProviderTrait>,
        key: &str,
    ) -> TransactionSender<crate::services::MockEvmProviderTrait> {
        let nonce_lock = Arc::new(NonceLockService::new(
            provider.clone(),
            Arc::new(NonceCounterRepositoryStorage::new_in_memory()),
            LockManager::new_in_memory(),
        ));
        let signer = LocalSigner::new(&SecretKey::new(key)).unwrap();
        TransactionSender::new(provider, signer, 1337, nonce_lock)
    }
}
