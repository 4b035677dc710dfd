use alloy::primitives::Address;
use thiserror::Error;

/// Failures of packed Safe signature decoding and verification.
///
/// Ordering, validity and threshold failures are kept apart so callers can
/// report which one tripped first.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Signatures length {0} is not a multiple of 65 bytes")]
    MalformedSignatures(usize),

    #[error("Invalid signature at position {index}: {reason}")]
    InvalidSignature { index: usize, reason: String },

    #[error("Signers are not sorted in ascending order")]
    SignaturesNotSorted,

    #[error("Need at least {required} signatures, got {provided}")]
    SignaturesNotFound { required: usize, provided: usize },

    #[error("Signature not provided by owner {0}")]
    SignatureNotProvidedByOwner(Address),
}
