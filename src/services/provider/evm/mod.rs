//! EVM Provider implementation for interacting with the chain the relay serves.
//!
//! Every call is wrapped in [`retry_rpc_call`] so transient node failures are
//! retried with backoff while reverts and rejections surface immediately.
use std::time::Duration;

use alloy::{
    consensus::Transaction as _,
    eips::BlockId,
    network::Ethereum,
    primitives::{keccak256, Address, Bytes, B256, U256},
    providers::{Provider, RootProvider},
    rpc::{
        client::ClientBuilder,
        types::{BlockNumberOrTag, TransactionRequest},
    },
    sol,
    sol_types::SolCall,
    transports::http::Http,
};
use async_trait::async_trait;
use reqwest::ClientBuilder as ReqwestClientBuilder;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use super::{is_retriable_error, retry_rpc_call, ProviderError, RetryConfig};
use crate::models::{ReceiptSummary, TransactionSummary};
use crate::utils::{classify_raw_tx_rejection, RawTxRejection};

sol! {
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
    }
}

type EvmProviderType = RootProvider<Ethereum>;

/// Provider implementation for the EVM chain the relay is attached to.
#[derive(Clone)]
pub struct EvmProvider {
    provider: EvmProviderType,
    /// Timeout in milliseconds of a single HTTP request
    timeout_ms: u64,
    /// Configuration for retry behavior
    retry_config: RetryConfig,
}

/// Trait defining the chain operations the relay depends on.
///
/// Keep it narrow: the reconciler and the relay gate are unit tested against
/// a mock of this trait.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait EvmProviderTrait: Send + Sync {
    /// Gets the current block number of the chain.
    async fn get_block_number(&self) -> Result<u64, ProviderError>;

    /// Gets the chain id.
    async fn get_chain_id(&self) -> Result<u64, ProviderError>;

    /// Gets the ether balance of an address.
    ///
    /// # Arguments
    /// * `address` - The address to query the balance for
    /// * `block` - Block to read at, `None` for latest
    async fn get_balance(&self, address: Address, block: Option<u64>)
        -> Result<U256, ProviderError>;

    /// Gets the ERC-20 balance of `owner`.
    ///
    /// # Arguments
    /// * `token` - The token contract
    /// * `owner` - The holder
    /// * `block` - Block to read at, `None` for latest
    async fn get_token_balance(
        &self,
        token: Address,
        owner: Address,
        block: Option<u64>,
    ) -> Result<U256, ProviderError>;

    /// Gets the pending transaction count (next nonce) of an address.
    async fn get_transaction_count(&self, address: Address) -> Result<u64, ProviderError>;

    /// Gets the current gas price from the network.
    async fn get_gas_price(&self) -> Result<u128, ProviderError>;

    /// Estimates the gas required for a transaction.
    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64, ProviderError>;

    /// Calls a contract function without sending a transaction.
    ///
    /// # Arguments
    /// * `tx` - The call request
    /// * `block` - Block to execute against, e.g. `BlockId::pending()`
    async fn call_contract(
        &self,
        tx: &TransactionRequest,
        block: BlockId,
    ) -> Result<Bytes, ProviderError>;

    /// Sends a raw signed transaction to the network.
    ///
    /// A node that already knows the transaction is not an error: the hash of
    /// `tx` is returned.
    async fn send_raw_transaction(&self, tx: &[u8]) -> Result<B256, ProviderError>;

    /// Gets a transaction receipt by its hash, `None` while not mined.
    async fn get_transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> Result<Option<ReceiptSummary>, ProviderError>;

    /// Gets a transaction by its hash, `None` when the node does not know it.
    async fn get_transaction_by_hash(
        &self,
        tx_hash: B256,
    ) -> Result<Option<TransactionSummary>, ProviderError>;

    /// Gets the deployed code at an address.
    async fn get_code(&self, address: Address) -> Result<Bytes, ProviderError>;

    /// Reads a storage slot of a contract.
    async fn get_storage_at(&self, address: Address, slot: U256) -> Result<B256, ProviderError>;

    /// Gets the gas prices paid by the transactions of a block.
    ///
    /// Returns `None` when the block does not exist.
    async fn get_block_gas_prices(
        &self,
        block_number: u64,
    ) -> Result<Option<Vec<u128>>, ProviderError>;
}

impl EvmProvider {
    /// Creates a new EVM provider instance.
    ///
    /// # Arguments
    /// * `url` - JSON-RPC endpoint of the node
    /// * `timeout_ms` - Timeout of a single HTTP request
    /// * `retry_config` - Retry behaviour for transient failures
    pub fn new(url: &str, timeout_ms: u64, retry_config: RetryConfig) -> Result<Self, ProviderError> {
        let rpc_url = url
            .parse()
            .map_err(|e| ProviderError::NetworkConfiguration(format!("Invalid URL format: {e}")))?;

        // Using use_rustls_tls() forces the use of rustls instead of native-tls to support TLS 1.3
        let client = ReqwestClientBuilder::new()
            .timeout(Duration::from_millis(timeout_ms))
            .use_rustls_tls()
            .build()
            .map_err(|e| ProviderError::Other(format!("Failed to build HTTP client: {e}")))?;

        let transport = Http::with_client(client, rpc_url);
        let is_local = transport.guess_local();
        let client = ClientBuilder::default().transport(transport, is_local);
        let provider = RootProvider::<Ethereum>::new(client);

        info!(url = %url, timeout_ms, "evm provider initialized");
        Ok(Self {
            provider,
            timeout_ms,
            retry_config,
        })
    }

    /// Helper method to retry RPC calls with exponential backoff
    async fn retry_rpc_call<T, F, Fut>(
        &self,
        operation_name: &str,
        operation: F,
    ) -> Result<T, ProviderError>
    where
        F: Fn(EvmProviderType) -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        debug!(
            operation = %operation_name,
            timeout_ms = self.timeout_ms,
            "starting rpc operation"
        );
        retry_rpc_call(
            operation_name,
            &self.retry_config,
            is_retriable_error,
            || operation(self.provider.clone()),
        )
        .await
    }
}

fn block_id(block: Option<u64>) -> BlockId {
    block.map(BlockId::number).unwrap_or_else(BlockId::latest)
}

#[async_trait]
impl EvmProviderTrait for EvmProvider {
    async fn get_block_number(&self) -> Result<u64, ProviderError> {
        self.retry_rpc_call("get_block_number", |provider| async move {
            provider
                .get_block_number()
                .await
                .map_err(ProviderError::from)
        })
        .await
    }

    async fn get_chain_id(&self) -> Result<u64, ProviderError> {
        self.retry_rpc_call("get_chain_id", |provider| async move {
            provider.get_chain_id().await.map_err(ProviderError::from)
        })
        .await
    }

    async fn get_balance(
        &self,
        address: Address,
        block: Option<u64>,
    ) -> Result<U256, ProviderError> {
        self.retry_rpc_call("get_balance", move |provider| async move {
            provider
                .get_balance(address)
                .block_id(block_id(block))
                .await
                .map_err(ProviderError::from)
        })
        .await
    }

    async fn get_token_balance(
        &self,
        token: Address,
        owner: Address,
        block: Option<u64>,
    ) -> Result<U256, ProviderError> {
        let request = TransactionRequest::default()
            .to(token)
            .input(Bytes::from(IERC20::balanceOfCall { owner }.abi_encode()).into());
        let output = self.call_contract(&request, block_id(block)).await?;
        IERC20::balanceOfCall::abi_decode_returns(&output)
            .map_err(|e| ProviderError::Other(format!("Invalid balanceOf output of {token}: {e}")))
    }

    async fn get_transaction_count(&self, address: Address) -> Result<u64, ProviderError> {
        self.retry_rpc_call("get_transaction_count", move |provider| async move {
            provider
                .get_transaction_count(address)
                .pending()
                .await
                .map_err(ProviderError::from)
        })
        .await
    }

    async fn get_gas_price(&self) -> Result<u128, ProviderError> {
        self.retry_rpc_call("get_gas_price", |provider| async move {
            provider.get_gas_price().await.map_err(ProviderError::from)
        })
        .await
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64, ProviderError> {
        self.retry_rpc_call("estimate_gas", move |provider| {
            let tx_req = tx.clone();
            async move {
                provider
                    .estimate_gas(tx_req)
                    .await
                    .map_err(ProviderError::from)
            }
        })
        .await
    }

    async fn call_contract(
        &self,
        tx: &TransactionRequest,
        block: BlockId,
    ) -> Result<Bytes, ProviderError> {
        self.retry_rpc_call("call_contract", move |provider| {
            let tx_req = tx.clone();
            async move {
                provider
                    .call(tx_req)
                    .block(block)
                    .await
                    .map_err(ProviderError::from)
            }
        })
        .await
    }

    async fn send_raw_transaction(&self, tx: &[u8]) -> Result<B256, ProviderError> {
        let result = self
            .retry_rpc_call("send_raw_transaction", move |provider| {
                let tx_data = tx.to_vec();
                async move {
                    provider
                        .send_raw_transaction(&tx_data)
                        .await
                        .map(|pending| *pending.tx_hash())
                        .map_err(ProviderError::from)
                }
            })
            .await;

        match result {
            Ok(hash) => Ok(hash),
            Err(ProviderError::RpcErrorCode { code, message }) => {
                match classify_raw_tx_rejection(&message) {
                    Some(RawTxRejection::AlreadyKnown) => {
                        let hash = keccak256(tx);
                        debug!(tx_hash = %hash, "node already knows the transaction");
                        Ok(hash)
                    }
                    Some(RawTxRejection::InsufficientFunds) => {
                        Err(ProviderError::InsufficientFunds(message))
                    }
                    Some(RawTxRejection::NonceTooLow) => Err(ProviderError::NonceTooLow(message)),
                    Some(RawTxRejection::ReplacementUnderpriced) => {
                        Err(ProviderError::ReplacementUnderpriced(message))
                    }
                    None => Err(ProviderError::RpcErrorCode { code, message }),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn get_transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> Result<Option<ReceiptSummary>, ProviderError> {
        let receipt = self
            .retry_rpc_call("get_transaction_receipt", move |provider| async move {
                provider
                    .get_transaction_receipt(tx_hash)
                    .await
                    .map_err(ProviderError::from)
            })
            .await?;

        Ok(receipt.map(|receipt| ReceiptSummary {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            status: receipt.status(),
            gas_used: receipt.gas_used,
        }))
    }

    async fn get_transaction_by_hash(
        &self,
        tx_hash: B256,
    ) -> Result<Option<TransactionSummary>, ProviderError> {
        let tx = self
            .retry_rpc_call("get_transaction_by_hash", move |provider| async move {
                provider
                    .get_transaction_by_hash(tx_hash)
                    .await
                    .map_err(ProviderError::from)
            })
            .await?;

        Ok(tx.map(|tx| TransactionSummary {
            hash: tx_hash,
            from: tx.inner.signer(),
            nonce: tx.nonce(),
            block_number: tx.block_number,
            gas_price: Some(tx.effective_gas_price.unwrap_or_else(|| tx.max_fee_per_gas())),
        }))
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, ProviderError> {
        self.retry_rpc_call("get_code", move |provider| async move {
            provider
                .get_code_at(address)
                .await
                .map_err(ProviderError::from)
        })
        .await
    }

    async fn get_storage_at(&self, address: Address, slot: U256) -> Result<B256, ProviderError> {
        let value = self
            .retry_rpc_call("get_storage_at", move |provider| async move {
                provider
                    .get_storage_at(address, slot)
                    .await
                    .map_err(ProviderError::from)
            })
            .await?;
        Ok(B256::from(value.to_be_bytes::<32>()))
    }

    async fn get_block_gas_prices(
        &self,
        block_number: u64,
    ) -> Result<Option<Vec<u128>>, ProviderError> {
        let block = self
            .retry_rpc_call("get_block_by_number", move |provider| async move {
                provider
                    .get_block_by_number(BlockNumberOrTag::Number(block_number))
                    .full()
                    .await
                    .map_err(ProviderError::from)
            })
            .await?;

        Ok(block.map(|block| {
            block
                .transactions
                .txns()
                .map(|tx| tx.effective_gas_price.unwrap_or_else(|| tx.max_fee_per_gas()))
                .collect()
        }))
    }
}
