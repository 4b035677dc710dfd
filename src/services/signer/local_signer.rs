//! Signer backed by a raw private key loaded from the environment.
use alloy::{
    consensus::{SignableTransaction, TxLegacy},
    primitives::{Address, Bytes, B256},
    network::TxSignerSync,
    signers::local::PrivateKeySigner,
};

use super::{SignedRawTransaction, SignerError};
use crate::config::SecretKey;

#[derive(Clone)]
pub struct LocalSigner {
    local_signer_client: PrivateKeySigner,
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address())
            .finish()
    }
}

impl LocalSigner {
    /// Builds the signer from a hex private key, with or without `0x`.
    pub fn new(key: &SecretKey) -> Result<Self, SignerError> {
        let raw = key.expose().trim();
        let key_bytes = hex::decode(raw.trim_start_matches("0x"))
            .map_err(|e| SignerError::InvalidKey(format!("private key is not hex: {e}")))?;
        if key_bytes.len() != 32 {
            return Err(SignerError::InvalidKey(format!(
                "private key must be 32 bytes, got {}",
                key_bytes.len()
            )));
        }
        let local_signer_client = PrivateKeySigner::from_bytes(&B256::from_slice(&key_bytes))
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(Self {
            local_signer_client,
        })
    }

    pub fn address(&self) -> Address {
        self.local_signer_client.address()
    }

    /// Signs a legacy transaction, replay protected with `tx.chain_id`.
    pub fn sign_transaction(&self, mut tx: TxLegacy) -> Result<SignedRawTransaction, SignerError> {
        let signature = self
            .local_signer_client
            .sign_transaction_sync(&mut tx)
            .map_err(|e| SignerError::SigningError(format!("Failed to sign transaction: {e}")))?;

        let signed_tx = tx.into_signed(signature);
        let mut raw = Vec::new();
        signed_tx.rlp_encode(&mut raw);

        Ok(SignedRawTransaction {
            hash: *signed_tx.hash(),
            raw: Bytes::from(raw),
        })
    }
}
