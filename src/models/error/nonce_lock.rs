use alloy::primitives::Address;
use thiserror::Error;

use super::RepositoryError;
use crate::services::ProviderError;

#[derive(Debug, Error)]
pub enum NonceLockError {
    #[error("Timed out waiting for the nonce lock of {0}")]
    Timeout(Address),

    #[error("Nonce store error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Could not seed nonce from chain: {0}")]
    Provider(#[from] ProviderError),
}

impl NonceLockError {
    pub fn is_transient(&self) -> bool {
        match self {
            NonceLockError::Timeout(_) => true,
            NonceLockError::Repository(e) => e.is_transient(),
            NonceLockError::Provider(e) => e.is_transient(),
        }
    }
}
