//! In-process chain for the end-to-end flows.
//!
//! Executes signed legacy transactions the way the relay's contracts would:
//! ether transfers, `createProxyWithNonce` on the proxy factory (including the
//! creation payment made by `setup`) and `execTransaction` on deployed Safes.
//! Every accepted transaction is mined immediately in its own block. Gas is
//! checked against the sender's balance but never charged.

use std::collections::HashMap;
use std::sync::Mutex;

use alloy::{
    consensus::{TxEnvelope, TxLegacy},
    eips::{eip2718::Decodable2718, BlockId},
    primitives::{keccak256, Address, Bytes, TxKind, B256, U256},
    rpc::types::TransactionRequest,
    sol_types::{Revert, SolCall, SolError, SolValue},
};
use async_trait::async_trait;

use safe_relay_service::{
    domain::safe::contracts::{IGnosisSafe, IProxyFactory},
    models::{ReceiptSummary, TransactionSummary},
    services::{EvmProviderTrait, ProviderError},
};

pub const CHAIN_ID: u64 = 1337;
pub const GENESIS_BLOCK: u64 = 100;
pub const NETWORK_GAS_PRICE: u128 = 10_000_000_000;
/// Gas `requiredTxGas` reports for any inner call.
pub const REQUIRED_TX_GAS: u64 = 45_000;
pub const SAFE_VERSION: &str = "1.1.1";

#[derive(Debug, Clone)]
pub struct MinedTx {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub value: U256,
    pub input: Bytes,
    pub block: u64,
    pub status: bool,
}

#[derive(Debug, Clone)]
struct SafeState {
    master_copy: Address,
    owners: Vec<Address>,
    threshold: u64,
    nonce: U256,
}

#[derive(Debug, Default)]
struct ChainState {
    block: u64,
    balances: HashMap<Address, U256>,
    nonces: HashMap<Address, u64>,
    code: HashMap<Address, Bytes>,
    safes: HashMap<Address, SafeState>,
    txs: Vec<MinedTx>,
}

impl ChainState {
    fn balance(&self, address: Address) -> U256 {
        self.balances.get(&address).copied().unwrap_or_default()
    }

    fn transfer(&mut self, from: Address, to: Address, value: U256) -> bool {
        let available = self.balance(from);
        if available < value {
            return false;
        }
        self.balances.insert(from, available - value);
        let received = self.balance(to) + value;
        self.balances.insert(to, received);
        true
    }
}

pub struct FakeChain {
    proxy_factory: Address,
    proxy_creation_code: Bytes,
    proxy_runtime_code: Bytes,
    state: Mutex<ChainState>,
}

fn selector(input: &[u8]) -> Option<[u8; 4]> {
    input.get(..4).map(|s| [s[0], s[1], s[2], s[3]])
}

fn reverted(reason: &str) -> ProviderError {
    ProviderError::ExecutionReverted {
        message: format!("execution reverted: {reason}"),
        data: Some(Bytes::from(Revert::from(reason.to_string()).abi_encode())),
    }
}

/// Revert data of `requiredTxGas`: the gas as a 32 byte string.
fn required_tx_gas_revert(gas: u64) -> ProviderError {
    let mut data = Revert::SELECTOR.to_vec();
    data.extend_from_slice(&U256::from(32u64).to_be_bytes::<32>());
    data.extend_from_slice(&U256::from(32u64).to_be_bytes::<32>());
    data.extend_from_slice(&U256::from(gas).to_be_bytes::<32>());
    ProviderError::ExecutionReverted {
        message: "execution reverted".into(),
        data: Some(Bytes::from(data)),
    }
}

impl FakeChain {
    pub fn new(proxy_factory: Address, proxy_creation_code: Bytes, proxy_runtime_code: Bytes) -> Self {
        let mut state = ChainState {
            block: GENESIS_BLOCK,
            ..Default::default()
        };
        state.code.insert(proxy_factory, Bytes::from_static(&[0x60, 0x80]));
        Self {
            proxy_factory,
            proxy_creation_code,
            proxy_runtime_code,
            state: Mutex::new(state),
        }
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.state.lock().unwrap().balances.insert(address, balance);
    }

    pub fn balance(&self, address: Address) -> U256 {
        self.state.lock().unwrap().balance(address)
    }

    pub fn code(&self, address: Address) -> Bytes {
        self.state
            .lock()
            .unwrap()
            .code
            .get(&address)
            .cloned()
            .unwrap_or_default()
    }

    pub fn safe_nonce(&self, safe: Address) -> Option<U256> {
        self.state.lock().unwrap().safes.get(&safe).map(|s| s.nonce)
    }

    /// Every transaction accepted so far, in submission order.
    pub fn transactions(&self) -> Vec<MinedTx> {
        self.state.lock().unwrap().txs.clone()
    }

    pub fn transaction_count(&self) -> usize {
        self.state.lock().unwrap().txs.len()
    }

    /// Mines `blocks` empty blocks.
    pub fn advance_blocks(&self, blocks: u64) {
        self.state.lock().unwrap().block += blocks;
    }

    /// Where the factory deploys a proxy, derived from the CREATE2 rule.
    fn proxy_address(&self, call: &IProxyFactory::createProxyWithNonceCall) -> Address {
        let mut preimage = keccak256(&call.initializer).to_vec();
        preimage.extend_from_slice(&call.saltNonce.to_be_bytes::<32>());
        let salt = keccak256(preimage);
        let mut init_code = self.proxy_creation_code.to_vec();
        init_code.extend_from_slice(call._mastercopy.into_word().as_slice());
        self.proxy_factory.create2(salt, keccak256(init_code))
    }

    fn create_proxy(&self, state: &mut ChainState, origin: Address, input: &[u8]) -> bool {
        let Ok(call) = IProxyFactory::createProxyWithNonceCall::abi_decode(input) else {
            return false;
        };
        let proxy = self.proxy_address(&call);
        if state.code.contains_key(&proxy) {
            return false;
        }
        let Ok(setup) = IGnosisSafe::setupCall::abi_decode(&call.initializer) else {
            return false;
        };
        if !setup.payment.is_zero() {
            // Token payments are out of scope for this chain
            if !setup.paymentToken.is_zero() {
                return false;
            }
            let receiver = if setup.paymentReceiver.is_zero() {
                origin
            } else {
                setup.paymentReceiver
            };
            if !state.transfer(proxy, receiver, setup.payment) {
                return false;
            }
        }
        state.code.insert(proxy, self.proxy_runtime_code.clone());
        state.safes.insert(
            proxy,
            SafeState {
                master_copy: call._mastercopy,
                owners: setup._owners,
                threshold: setup._threshold.to::<u64>(),
                nonce: U256::ZERO,
            },
        );
        true
    }

    fn exec_transaction(state: &mut ChainState, safe: Address, input: &[u8]) -> bool {
        let Ok(call) = IGnosisSafe::execTransactionCall::abi_decode(input) else {
            return false;
        };
        let Some(threshold) = state.safes.get(&safe).map(|s| s.threshold) else {
            return false;
        };
        if (call.signatures.len() as u64) < threshold * 65 {
            return false;
        }
        if !state.transfer(safe, call.to, call.value) {
            return false;
        }
        if let Some(safe_state) = state.safes.get_mut(&safe) {
            safe_state.nonce += U256::from(1u64);
        }
        true
    }

    fn execute(&self, state: &mut ChainState, from: Address, tx: &TxLegacy) -> bool {
        let TxKind::Call(to) = tx.to else {
            return true;
        };
        let snapshot = (state.balances.clone(), state.code.clone(), state.safes.clone());
        let mut status = state.transfer(from, to, tx.value);
        if status && to == self.proxy_factory {
            status = selector(&tx.input) == Some(IProxyFactory::createProxyWithNonceCall::SELECTOR)
                && self.create_proxy(state, from, &tx.input);
        } else if status && state.safes.contains_key(&to) {
            status = selector(&tx.input) == Some(IGnosisSafe::execTransactionCall::SELECTOR)
                && Self::exec_transaction(state, to, &tx.input);
        }
        if !status {
            (state.balances, state.code, state.safes) = snapshot;
        }
        status
    }

    fn safe_call(&self, state: &ChainState, to: Address, input: &[u8]) -> Result<Bytes, ProviderError> {
        let Some(safe) = state.safes.get(&to) else {
            // Calls to accounts without code return nothing
            return Ok(Bytes::new());
        };
        let selector = selector(input).unwrap_or_default();
        let output = if selector == IGnosisSafe::getThresholdCall::SELECTOR {
            U256::from(safe.threshold).abi_encode()
        } else if selector == IGnosisSafe::getOwnersCall::SELECTOR {
            safe.owners.abi_encode()
        } else if selector == IGnosisSafe::nonceCall::SELECTOR {
            safe.nonce.abi_encode()
        } else if selector == IGnosisSafe::VERSIONCall::SELECTOR {
            SAFE_VERSION.to_string().abi_encode()
        } else if selector == IGnosisSafe::requiredTxGasCall::SELECTOR {
            return Err(required_tx_gas_revert(REQUIRED_TX_GAS));
        } else if selector == IGnosisSafe::execTransactionCall::SELECTOR {
            let call = IGnosisSafe::execTransactionCall::abi_decode(input)
                .map_err(|e| ProviderError::Other(e.to_string()))?;
            if (call.signatures.len() as u64) < safe.threshold * 65 {
                return Err(reverted("GS020"));
            }
            if state.balance(to) < call.value {
                return Err(reverted("GS013"));
            }
            true.abi_encode()
        } else {
            return Err(reverted("unknown selector"));
        };
        Ok(Bytes::from(output))
    }
}

#[async_trait]
impl EvmProviderTrait for FakeChain {
    async fn get_block_number(&self) -> Result<u64, ProviderError> {
        Ok(self.state.lock().unwrap().block)
    }

    async fn get_chain_id(&self) -> Result<u64, ProviderError> {
        Ok(CHAIN_ID)
    }

    async fn get_balance(&self, address: Address, _block: Option<u64>) -> Result<U256, ProviderError> {
        Ok(self.balance(address))
    }

    async fn get_token_balance(
        &self,
        _token: Address,
        _owner: Address,
        _block: Option<u64>,
    ) -> Result<U256, ProviderError> {
        Ok(U256::ZERO)
    }

    async fn get_transaction_count(&self, address: Address) -> Result<u64, ProviderError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .nonces
            .get(&address)
            .copied()
            .unwrap_or_default())
    }

    async fn get_gas_price(&self) -> Result<u128, ProviderError> {
        Ok(NETWORK_GAS_PRICE)
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64, ProviderError> {
        let to = tx.to.and_then(|kind| kind.to().copied());
        let has_input = tx.input.input().is_some_and(|input| !input.is_empty());
        Ok(match to {
            Some(to) if to == self.proxy_factory => 250_000,
            _ if has_input => 100_000,
            _ => 21_000,
        })
    }

    async fn call_contract(
        &self,
        tx: &TransactionRequest,
        _block: BlockId,
    ) -> Result<Bytes, ProviderError> {
        let to = tx
            .to
            .and_then(|kind| kind.to().copied())
            .ok_or_else(|| ProviderError::Other("call without recipient".into()))?;
        let input = tx.input.input().cloned().unwrap_or_default();
        let state = self.state.lock().unwrap();

        if to == self.proxy_factory {
            let selector = selector(&input).unwrap_or_default();
            return if selector == IProxyFactory::proxyCreationCodeCall::SELECTOR {
                Ok(Bytes::from(self.proxy_creation_code.abi_encode()))
            } else if selector == IProxyFactory::proxyRuntimeCodeCall::SELECTOR {
                Ok(Bytes::from(self.proxy_runtime_code.abi_encode()))
            } else {
                Err(reverted("unknown selector"))
            };
        }
        self.safe_call(&state, to, &input)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, ProviderError> {
        let envelope = TxEnvelope::decode_2718(&mut &raw[..])
            .map_err(|e| ProviderError::Other(format!("undecodable transaction: {e}")))?;
        let TxEnvelope::Legacy(signed) = envelope else {
            return Err(ProviderError::Other("only legacy transactions are accepted".into()));
        };
        let from = signed
            .signature()
            .recover_address_from_prehash(&signed.signature_hash())
            .map_err(|e| ProviderError::Other(format!("invalid signature: {e}")))?;
        let hash = keccak256(raw);
        let tx = signed.tx();

        let mut state = self.state.lock().unwrap();
        if state.txs.iter().any(|mined| mined.hash == hash) {
            return Ok(hash);
        }
        let expected = state.nonces.get(&from).copied().unwrap_or_default();
        if tx.nonce < expected {
            return Err(ProviderError::NonceTooLow(format!(
                "nonce too low: next nonce {expected}, tx nonce {}",
                tx.nonce
            )));
        }
        if tx.nonce > expected {
            return Err(ProviderError::Other(format!(
                "nonce gap: next nonce {expected}, tx nonce {}",
                tx.nonce
            )));
        }
        let cost = tx.value + U256::from(tx.gas_limit) * U256::from(tx.gas_price);
        if state.balance(from) < cost {
            return Err(ProviderError::InsufficientFunds(format!(
                "insufficient funds for gas * price + value: have {} want {cost}",
                state.balance(from)
            )));
        }

        state.nonces.insert(from, expected + 1);
        let status = self.execute(&mut state, from, tx);
        state.block += 1;
        let block = state.block;
        state.txs.push(MinedTx {
            hash,
            from,
            to: tx.to.to().copied(),
            nonce: tx.nonce,
            gas_price: tx.gas_price,
            gas_limit: tx.gas_limit,
            value: tx.value,
            input: tx.input.clone(),
            block,
            status,
        });
        Ok(hash)
    }

    async fn get_transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> Result<Option<ReceiptSummary>, ProviderError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .txs
            .iter()
            .find(|tx| tx.hash == tx_hash)
            .map(|tx| ReceiptSummary {
                transaction_hash: tx.hash,
                block_number: Some(tx.block),
                status: tx.status,
                gas_used: tx.gas_limit.min(150_000),
            }))
    }

    async fn get_transaction_by_hash(
        &self,
        tx_hash: B256,
    ) -> Result<Option<TransactionSummary>, ProviderError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .txs
            .iter()
            .find(|tx| tx.hash == tx_hash)
            .map(|tx| TransactionSummary {
                hash: tx.hash,
                from: tx.from,
                nonce: tx.nonce,
                block_number: Some(tx.block),
                gas_price: Some(tx.gas_price),
            }))
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, ProviderError> {
        Ok(self.code(address))
    }

    async fn get_storage_at(&self, address: Address, slot: U256) -> Result<B256, ProviderError> {
        let state = self.state.lock().unwrap();
        Ok(match state.safes.get(&address) {
            Some(safe) if slot.is_zero() => safe.master_copy.into_word(),
            _ => B256::ZERO,
        })
    }

    async fn get_block_gas_prices(
        &self,
        block_number: u64,
    ) -> Result<Option<Vec<u128>>, ProviderError> {
        let state = self.state.lock().unwrap();
        if block_number > state.block {
            return Ok(None);
        }
        Ok(Some(
            state
                .txs
                .iter()
                .filter(|tx| tx.block == block_number)
                .map(|tx| tx.gas_price)
                .collect(),
        ))
    }
}
