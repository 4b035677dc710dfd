//! # Signer Module
//!
//! Keys held by the relay: the funder (legacy deployer funding, CREATE2
//! deployments) and the transaction sender (relayed multisig transactions).
use alloy::primitives::{Bytes, B256};
use thiserror::Error;

mod local_signer;
pub use local_signer::*;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignerError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Failed to sign: {0}")]
    SigningError(String),
}

/// A signed transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRawTransaction {
    pub hash: B256,
    pub raw: Bytes,
}
