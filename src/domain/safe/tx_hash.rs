//! EIP-712 hashes of Safe transactions, one encoding per Safe release.
use alloy::{
    primitives::{keccak256, Address, Bytes, B256, U256},
    sol_types::SolValue,
};
use once_cell::sync::Lazy;

use crate::models::{MultisigTxRequest, SafeOperation, SafeVersion};

static SAFE_TX_TYPEHASH: Lazy<B256> = Lazy::new(|| {
    keccak256(
        "SafeTx(address to,uint256 value,bytes data,uint8 operation,uint256 safeTxGas,\
         uint256 baseGas,uint256 gasPrice,address gasToken,address refundReceiver,uint256 nonce)",
    )
});

static SAFE_TX_TYPEHASH_DATA_GAS: Lazy<B256> = Lazy::new(|| {
    keccak256(
        "SafeTx(address to,uint256 value,bytes data,uint8 operation,uint256 safeTxGas,\
         uint256 dataGas,uint256 gasPrice,address gasToken,address refundReceiver,uint256 nonce)",
    )
});

static DOMAIN_TYPEHASH: Lazy<B256> =
    Lazy::new(|| keccak256("EIP712Domain(address verifyingContract)"));

static DOMAIN_WITH_CHAIN_ID_TYPEHASH: Lazy<B256> =
    Lazy::new(|| keccak256("EIP712Domain(uint256 chainId,address verifyingContract)"));

/// The signed part of a Safe transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SafeTx {
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
}

impl From<&MultisigTxRequest> for SafeTx {
    fn from(request: &MultisigTxRequest) -> Self {
        Self {
            to: request.to,
            value: request.value,
            data: request.data.clone(),
            operation: request.operation,
            safe_tx_gas: request.safe_tx_gas,
            base_gas: request.base_gas,
            gas_price: request.gas_price,
            gas_token: request.gas_token,
            refund_receiver: request.refund_receiver,
            nonce: request.nonce,
        }
    }
}

impl SafeTx {
    fn struct_hash(&self, version: SafeVersion) -> B256 {
        let typehash = if version.uses_data_gas() {
            *SAFE_TX_TYPEHASH_DATA_GAS
        } else {
            *SAFE_TX_TYPEHASH
        };
        keccak256(
            (
                typehash,
                self.to,
                self.value,
                keccak256(&self.data),
                U256::from(self.operation.as_u8()),
                self.safe_tx_gas,
                self.base_gas,
                self.gas_price,
                self.gas_token,
                self.refund_receiver,
                self.nonce,
            )
                .abi_encode(),
        )
    }
}

pub fn domain_separator(safe: Address, version: SafeVersion, chain_id: u64) -> B256 {
    if version.uses_chain_id() {
        keccak256((*DOMAIN_WITH_CHAIN_ID_TYPEHASH, U256::from(chain_id), safe).abi_encode())
    } else {
        keccak256((*DOMAIN_TYPEHASH, safe).abi_encode())
    }
}

/// Hash the owners of `safe` sign to approve `tx`.
///
/// `chain_id` only takes part from 1.3.0 on.
pub fn compute_safe_tx_hash(safe: Address, tx: &SafeTx, version: SafeVersion, chain_id: u64) -> B256 {
    let mut message = Vec::with_capacity(66);
    message.extend_from_slice(&[0x19, 0x01]);
    message.extend_from_slice(domain_separator(safe, version, chain_id).as_slice());
    message.extend_from_slice(tx.struct_hash(version).as_slice());
    keccak256(message)
}
