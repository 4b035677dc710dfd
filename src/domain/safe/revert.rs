//! Typed decoding of `execTransaction` simulation reverts.
use alloy::{primitives::Bytes, sol_types::decode_revert_reason};

use crate::models::SafeRelayError;
use crate::services::ProviderError;

/// Why a Safe refused to execute a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertKind {
    SignatureNotProvidedByOwner,
    InvalidSignaturesProvided,
    CannotPayGasWithEther,
    Other,
}

impl RevertKind {
    /// Matches both the pre 1.3.0 messages and the `GSxxx` codes.
    pub fn classify(reason: &str) -> Self {
        if reason.contains("Signature not provided by owner") || reason.contains("GS026") {
            RevertKind::SignatureNotProvidedByOwner
        } else if reason.contains("Invalid signatures provided")
            || ["GS020", "GS021", "GS022", "GS023", "GS024", "GS025"]
                .iter()
                .any(|code| reason.contains(code))
        {
            RevertKind::InvalidSignaturesProvided
        } else if reason.contains("Could not pay gas costs with ether") || reason.contains("GS011") {
            RevertKind::CannotPayGasWithEther
        } else {
            RevertKind::Other
        }
    }

    pub fn into_error(self, reason: String) -> SafeRelayError {
        match self {
            RevertKind::SignatureNotProvidedByOwner => {
                SafeRelayError::SignatureNotProvidedByOwner(reason)
            }
            RevertKind::InvalidSignaturesProvided => SafeRelayError::InvalidSignaturesProvided(reason),
            RevertKind::CannotPayGasWithEther => SafeRelayError::CannotPayGasWithEther(reason),
            RevertKind::Other => SafeRelayError::InvalidMultisigTx(reason),
        }
    }
}

/// Human readable reason of a revert, preferring the ABI decoded data.
pub fn revert_reason(message: &str, data: Option<&Bytes>) -> String {
    data.and_then(|data| decode_revert_reason(data))
        .unwrap_or_else(|| message.to_string())
}

/// Turns a failed `execTransaction` simulation into a relay error.
///
/// Errors other than a revert are passed through untouched.
pub fn map_simulation_error(error: ProviderError) -> SafeRelayError {
    match error {
        ProviderError::ExecutionReverted { message, data } => {
            let reason = revert_reason(&message, data.as_ref());
            RevertKind::classify(&reason).into_error(reason)
        }
        other => SafeRelayError::Provider(other),
    }
}
