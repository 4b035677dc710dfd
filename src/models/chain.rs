use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// The receipt fields the reconciler needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptSummary {
    pub transaction_hash: B256,
    pub block_number: Option<u64>,
    pub status: bool,
    pub gas_used: u64,
}

/// A transaction as seen by the node, mined or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub hash: B256,
    pub from: Address,
    pub nonce: u64,
    pub block_number: Option<u64>,
    pub gas_price: Option<u128>,
}
