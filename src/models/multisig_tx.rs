use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use super::SafeOperation;

/// Parameters of a Safe `execTransaction` call submitted for relaying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigTxRequest {
    pub safe: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub operation: SafeOperation,
    pub safe_tx_gas: U256,
    pub base_gas: U256,
    pub gas_price: U256,
    pub gas_token: Address,
    pub refund_receiver: Address,
    pub nonce: U256,
    pub signatures: Bytes,
}

/// A multisig tx the relay has submitted. Unique per `(safe, nonce)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayedMultisigTransaction {
    pub safe: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub operation: SafeOperation,
    pub safe_tx_gas: U256,
    pub base_gas: U256,
    pub gas_price: U256,
    pub gas_token: Address,
    pub refund_receiver: Address,
    pub nonce: U256,
    pub signatures: Bytes,
    pub safe_tx_hash: B256,
    pub tx_hash: B256,
    pub tx_nonce: u64,
    pub tx_gas: u64,
    pub tx_gas_price: u128,
    pub created_at: String,
}

/// Gas quote for a multisig tx.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeTxEstimate {
    pub safe_tx_gas: u64,
    pub base_gas: u64,
    pub gas_price: u128,
    pub gas_token: Address,
    pub last_used_nonce: Option<U256>,
}
