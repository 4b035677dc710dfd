use alloy::primitives::{Address, U256};
use serde::Serialize;
use strum::Display;
use thiserror::Error;

use super::{NonceLockError, RepositoryError, SignatureError};
use crate::services::{GasStationError, ProviderError, SignerError};

/// Coarse classification driving retry decisions at the task boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input. Never retried.
    Validation,
    /// The request cannot be paid for. Terminal for the request.
    EconomicGuard,
    /// Chain or store hiccup. Retried with backoff.
    Transient,
    /// The entity already exists. Never retried.
    Conflict,
    /// Unrecoverable for this entity.
    Terminal,
}

#[derive(Debug, Error)]
pub enum SafeRelayError {
    // Validation
    #[error("Invalid owners: {0}")]
    InvalidOwners(String),

    #[error("Threshold {threshold} is not valid for {owners} owners")]
    InvalidThreshold { threshold: u64, owners: usize },

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error("Invalid setup data: {0}")]
    InvalidSetupData(String),

    #[error("Refund receiver must be the zero address, got {0}")]
    InvalidRefundReceiver(Address),

    #[error("Refund must be enabled, gas price cannot be zero")]
    RefundMustBeEnabled,

    #[error("Signature not provided by owner: {0}")]
    SignatureNotProvidedByOwner(String),

    #[error("Invalid signatures provided: {0}")]
    InvalidSignaturesProvided(String),

    #[error("Invalid multisig tx: {0}")]
    InvalidMultisigTx(String),

    #[error("Proxy at {0} does not match the proxy factory runtime code")]
    InvalidProxyContract(Address),

    #[error("Master copy {0} is not supported")]
    InvalidMasterCopyAddress(Address),

    #[error("Gas parameters below estimation: safe_tx_gas {safe_tx_gas} < {estimated_safe_tx_gas} or base_gas {base_gas} < {estimated_base_gas}")]
    InvalidGasEstimation {
        safe_tx_gas: U256,
        base_gas: U256,
        estimated_safe_tx_gas: u64,
        estimated_base_gas: u64,
    },

    #[error("Gas estimation failed: {0}")]
    GasEstimationFailed(String),

    #[error("Could not find a valid legacy deployer for the provided s value")]
    InvalidLegacySignature,

    #[error("Legacy creation is not configured: {0}")]
    LegacyCreationUnavailable(String),

    // Economic guards
    #[error("Safe {safe} balance {balance} does not cover payment {payment}")]
    NotEnoughFundingForCreation {
        safe: Address,
        balance: U256,
        payment: U256,
    },

    #[error("Gas price {provided} is lower than the required {required}")]
    GasPriceTooLow { required: U256, provided: U256 },

    #[error("Gas token {0} is not accepted")]
    InvalidGasToken(Address),

    #[error("Payment token {0} is not accepted")]
    InvalidPaymentToken(Address),

    #[error("Cannot get a price for token {0}")]
    CannotGetTokenPrice(Address),

    #[error("Safe {safe} cannot pay {required} for the multisig tx, balance {balance}")]
    NotEnoughFundsForMultisigTx {
        safe: Address,
        balance: U256,
        required: U256,
    },

    #[error("Could not pay gas costs with ether: {0}")]
    CannotPayGasWithEther(String),

    #[error("Transfer of {value} wei exceeds the funder limit of {limit} wei")]
    EtherLimitExceeded { value: U256, limit: U256 },

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    // Conflicts
    #[error("Safe {0} was already created")]
    SafeAlreadyExists(Address),

    #[error("Multisig tx with nonce {nonce} already relayed for safe {safe}")]
    SafeMultisigTxExists { safe: Address, nonce: U256 },

    // Terminal
    #[error("No deploy transaction exists for safe {0}")]
    DeployTransactionDoesNotExist(Address),

    #[error("Safe {0} is not deployed")]
    SafeNotDeployed(Address),

    #[error("Safe {0} does not exist")]
    SafeDoesNotExist(Address),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    // Transient
    #[error("Step {step} is already running for safe {safe}")]
    StepInProgress { step: String, safe: Address },

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Repository error: {0}")]
    Repository(RepositoryError),

    #[error("Nonce lock error: {0}")]
    NonceLock(#[from] NonceLockError),

    #[error("Gas station error: {0}")]
    GasStation(#[from] GasStationError),

    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),
}

impl SafeRelayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SafeRelayError::InvalidOwners(_)
            | SafeRelayError::InvalidThreshold { .. }
            | SafeRelayError::Signature(_)
            | SafeRelayError::InvalidSetupData(_)
            | SafeRelayError::InvalidRefundReceiver(_)
            | SafeRelayError::RefundMustBeEnabled
            | SafeRelayError::SignatureNotProvidedByOwner(_)
            | SafeRelayError::InvalidSignaturesProvided(_)
            | SafeRelayError::InvalidMultisigTx(_)
            | SafeRelayError::InvalidProxyContract(_)
            | SafeRelayError::InvalidMasterCopyAddress(_)
            | SafeRelayError::InvalidGasEstimation { .. }
            | SafeRelayError::GasEstimationFailed(_)
            | SafeRelayError::InvalidLegacySignature
            | SafeRelayError::LegacyCreationUnavailable(_) => ErrorKind::Validation,

            SafeRelayError::NotEnoughFundingForCreation { .. }
            | SafeRelayError::GasPriceTooLow { .. }
            | SafeRelayError::InvalidGasToken(_)
            | SafeRelayError::InvalidPaymentToken(_)
            | SafeRelayError::CannotGetTokenPrice(_)
            | SafeRelayError::NotEnoughFundsForMultisigTx { .. }
            | SafeRelayError::CannotPayGasWithEther(_)
            | SafeRelayError::EtherLimitExceeded { .. }
            | SafeRelayError::InsufficientFunds(_) => ErrorKind::EconomicGuard,

            SafeRelayError::SafeAlreadyExists(_) | SafeRelayError::SafeMultisigTxExists { .. } => {
                ErrorKind::Conflict
            }

            SafeRelayError::DeployTransactionDoesNotExist(_)
            | SafeRelayError::SafeNotDeployed(_)
            | SafeRelayError::SafeDoesNotExist(_)
            | SafeRelayError::NotFound(_)
            | SafeRelayError::Internal(_) => ErrorKind::Terminal,

            SafeRelayError::StepInProgress { .. } => ErrorKind::Transient,
            SafeRelayError::Provider(e) if e.is_transient() => ErrorKind::Transient,
            SafeRelayError::Repository(e) if e.is_transient() => ErrorKind::Transient,
            SafeRelayError::NonceLock(e) if e.is_transient() => ErrorKind::Transient,
            SafeRelayError::GasStation(e) if e.is_transient() => ErrorKind::Transient,
            SafeRelayError::Provider(_)
            | SafeRelayError::Repository(_)
            | SafeRelayError::NonceLock(_)
            | SafeRelayError::GasStation(_)
            | SafeRelayError::Signer(_) => ErrorKind::Terminal,
        }
    }

    /// Whether the scheduler may retry the step that produced this error.
    ///
    /// Missing creation funds are retried too: the Safe may be funded later.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
            || matches!(self, SafeRelayError::NotEnoughFundingForCreation { .. })
    }
}

impl From<RepositoryError> for SafeRelayError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound(msg) => SafeRelayError::NotFound(msg),
            other => SafeRelayError::Repository(other),
        }
    }
}
