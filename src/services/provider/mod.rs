use alloy::{primitives::Bytes, transports::RpcError};
use serde::Serialize;
use thiserror::Error;

use crate::utils::{is_retriable_error_code, EXECUTION_REVERTED_CODE};

pub mod evm;
pub use evm::*;

mod retry;
pub use retry::*;

#[derive(Error, Debug, Serialize, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Network configuration error: {0}")]
    NetworkConfiguration(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Rate limited (HTTP 429)")]
    RateLimited,

    #[error("Bad gateway (HTTP 502)")]
    BadGateway,

    #[error("Request error (HTTP {status_code}): {error}")]
    RequestError { error: String, status_code: u16 },

    #[error("JSON-RPC error (code {code}): {message}")]
    RpcErrorCode { code: i64, message: String },

    #[error("Execution reverted: {message}")]
    ExecutionReverted {
        message: String,
        data: Option<Bytes>,
    },

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Nonce too low: {0}")]
    NonceTooLow(String),

    #[error("Replacement transaction underpriced: {0}")]
    ReplacementUnderpriced(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Other provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Determines if this error is transient (can retry) or permanent (should fail).
    pub fn is_transient(&self) -> bool {
        is_retriable_error(self)
    }
}

/// Categorizes a reqwest error into an appropriate `ProviderError` variant.
///
/// - Timeout errors become `ProviderError::Timeout`
/// - HTTP 429 responses become `ProviderError::RateLimited`
/// - HTTP 502 responses become `ProviderError::BadGateway`
/// - All other errors become `ProviderError::Other` with the error message
fn categorize_reqwest_error(err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        return ProviderError::Timeout;
    }

    if let Some(status) = err.status() {
        match status.as_u16() {
            429 => return ProviderError::RateLimited,
            502 => return ProviderError::BadGateway,
            _ => {
                return ProviderError::RequestError {
                    error: err.to_string(),
                    status_code: status.as_u16(),
                }
            }
        }
    }

    ProviderError::Other(err.to_string())
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        categorize_reqwest_error(&err)
    }
}

impl From<String> for ProviderError {
    fn from(error: String) -> Self {
        ProviderError::Other(error)
    }
}

impl<E> From<RpcError<E>> for ProviderError
where
    E: std::fmt::Display + std::any::Any + 'static,
{
    fn from(err: RpcError<E>) -> Self {
        match err {
            RpcError::Transport(transport_err) => {
                if let Some(reqwest_err) =
                    (&transport_err as &dyn std::any::Any).downcast_ref::<reqwest::Error>()
                {
                    return categorize_reqwest_error(reqwest_err);
                }
                if transport_err.to_string().to_lowercase().contains("timed out") {
                    return ProviderError::Timeout;
                }
                ProviderError::TransportError(transport_err.to_string())
            }
            RpcError::ErrorResp(json_rpc_err) => {
                let data = json_rpc_err.as_revert_data();
                let message = json_rpc_err.message.to_string();
                if data.is_some()
                    || json_rpc_err.code == EXECUTION_REVERTED_CODE
                    || message.to_lowercase().contains("revert")
                {
                    return ProviderError::ExecutionReverted { message, data };
                }
                ProviderError::RpcErrorCode {
                    code: json_rpc_err.code,
                    message,
                }
            }
            _ => ProviderError::Other(format!("Other RPC error: {err}")),
        }
    }
}

// Errors that are retriable
pub fn is_retriable_error(error: &ProviderError) -> bool {
    match error {
        ProviderError::Timeout
        | ProviderError::RateLimited
        | ProviderError::BadGateway
        | ProviderError::TransportError(_) => true,

        ProviderError::RequestError { status_code, .. } => match *status_code {
            // Non-retriable 5xx: persistent server-side issues
            501 | 505 => false,
            500 | 502..=504 | 506..=599 => true,
            // Retriable 4xx: timeout or rate-limit related
            408 | 425 | 429 => true,
            _ => false,
        },

        ProviderError::RpcErrorCode { code, .. } => is_retriable_error_code(*code),

        // The node answered; asking again yields the same answer
        ProviderError::ExecutionReverted { .. }
        | ProviderError::InsufficientFunds(_)
        | ProviderError::NonceTooLow(_)
        | ProviderError::ReplacementUnderpriced(_)
        | ProviderError::InvalidAddress(_)
        | ProviderError::NetworkConfiguration(_) => false,

        ProviderError::Other(msg) => {
            let msg_lower = msg.to_lowercase();
            msg_lower.contains("timeout")
                || msg_lower.contains("connection")
                || msg_lower.contains("reset")
        }
    }
}
