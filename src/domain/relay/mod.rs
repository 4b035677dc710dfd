//! # Relay Transaction Gate
//!
//! Validates a signed Safe transaction and forwards it through
//! `execTransaction`, paid by the relay's tx sender and refunded by the Safe.
//! Every check runs before anything is sent, so a rejected request leaves
//! neither a transaction nor a stored record behind. A `(safe, nonce)` pair
//! is reserved for the whole check, send and persist sequence, so concurrent
//! requests for the same nonce send at most one transaction.
use std::{sync::Arc, time::Duration};

use alloy::{
    eips::BlockId,
    primitives::{Address, Bytes, TxKind, U256},
    rpc::types::TransactionRequest,
    sol_types::SolCall,
};
use tracing::{debug, error, info, warn};

use crate::constants::{
    BASE_GAS_LARGE_DATA_THRESHOLD, BASE_GAS_PER_SIGNATURE, BASE_GAS_TX_OVERHEAD,
    GAS_TX_DATA_NONZERO, GAS_TX_DATA_ZERO, MULTISIG_TX_RESERVATION_TTL_SECS, SAFE_TX_GAS_MARGIN,
    SIGNATURE_LENGTH, TOKEN_PAYMENT_EXTRA_GAS,
};
use crate::domain::safe::{
    compute_safe_tx_hash, contracts::IGnosisSafe, map_simulation_error, recover_signers,
    SafeReader, SafeTx,
};
use crate::models::{
    MultisigTxRequest, RelayedMultisigTransaction, RepositoryError, SafeContracts,
    SafeOperation, SafeRelayError, SafeTxEstimate, SignatureError, Token,
};
use crate::repositories::{
    MultisigTxRepositoryStorage, MultisigTxRepositoryTrait, TokenRepositoryStorage,
    TokenRepositoryTrait,
};
use crate::services::{
    EvmProviderTrait, GasStationService, GasStationTrait, ProviderError, TransactionParams,
    TransactionSender,
};
use crate::utils::{now_rfc3339, LockManager};

/// Calldata gas of `data` at the current per byte prices.
pub fn calldata_gas(data: &[u8]) -> u64 {
    data.iter()
        .map(|byte| {
            if *byte == 0 {
                GAS_TX_DATA_ZERO
            } else {
                GAS_TX_DATA_NONZERO
            }
        })
        .sum()
}

/// Gas the Safe reports through the revert data of `requiredTxGas`.
///
/// The value travels as a 32 byte string inside `Error(string)`.
fn decode_required_tx_gas(output: &[u8]) -> Option<u64> {
    const ENCODED_LEN: usize = 4 + 32 * 3;
    if output.len() != ENCODED_LEN {
        return None;
    }
    let gas = U256::from_be_slice(&output[ENCODED_LEN - 32..]);
    u64::try_from(gas).ok()
}

pub struct RelayService<P: EvmProviderTrait> {
    provider: Arc<P>,
    contracts: Arc<SafeContracts>,
    multisig_txs: Arc<MultisigTxRepositoryStorage>,
    tokens: Arc<TokenRepositoryStorage>,
    gas_station: Arc<GasStationService<P>>,
    tx_sender: Arc<TransactionSender<P>>,
    reader: SafeReader<P>,
    lock_manager: LockManager,
    chain_id: u64,
}

#[allow(clippy::too_many_arguments)]
impl<P: EvmProviderTrait> RelayService<P> {
    pub fn new(
        provider: Arc<P>,
        contracts: Arc<SafeContracts>,
        multisig_txs: Arc<MultisigTxRepositoryStorage>,
        tokens: Arc<TokenRepositoryStorage>,
        gas_station: Arc<GasStationService<P>>,
        tx_sender: Arc<TransactionSender<P>>,
        lock_manager: LockManager,
        chain_id: u64,
    ) -> Self {
        let reader = SafeReader::new(provider.clone(), contracts.default_version);
        Self {
            provider,
            contracts,
            multisig_txs,
            tokens,
            gas_station,
            tx_sender,
            reader,
            lock_manager,
            chain_id,
        }
    }

    /// Registered gas token for `gas_token`, `None` for ether.
    async fn gas_token(&self, gas_token: Address) -> Result<Option<Token>, SafeRelayError> {
        if gas_token.is_zero() {
            return Ok(None);
        }
        match self.tokens.get_gas_token(gas_token).await? {
            Some(token) => Ok(Some(token)),
            None => {
                warn!(gas_token = %gas_token, "gas token not valid");
                Err(SafeRelayError::InvalidGasToken(gas_token))
            }
        }
    }

    /// `gas_price` wei expressed in `token` units.
    fn token_gas_price(token: Option<&Token>, gas_price: u128) -> Result<u128, SafeRelayError> {
        match token {
            Some(token) => token
                .calculate_gas_price(gas_price, 1.0)
                .ok_or(SafeRelayError::CannotGetTokenPrice(token.address)),
            None => Ok(gas_price),
        }
    }

    async fn check_gas_price(
        &self,
        token: Option<&Token>,
        gas_price: U256,
    ) -> Result<(), SafeRelayError> {
        let standard = self.gas_station.get_gas_prices().await?.standard;
        let required = U256::from(Self::token_gas_price(token, standard)?);
        if gas_price < required {
            return Err(SafeRelayError::GasPriceTooLow {
                required,
                provided: gas_price,
            });
        }
        Ok(())
    }

    async fn check_proxy_code(&self, safe: Address) -> Result<(), SafeRelayError> {
        let Some(expected) = self.contracts.proxy_runtime_code.as_ref() else {
            return Ok(());
        };
        let code = self.provider.get_code(safe).await?;
        if &code != expected {
            return Err(SafeRelayError::InvalidProxyContract(safe));
        }
        Ok(())
    }

    async fn check_master_copy(&self, safe: Address) -> Result<(), SafeRelayError> {
        let master_copy = self.reader.master_copy(safe).await?;
        if !self.contracts.valid_master_copies.contains(&master_copy) {
            return Err(SafeRelayError::InvalidMasterCopyAddress(master_copy));
        }
        Ok(())
    }

    async fn check_funds(&self, request: &MultisigTxRequest) -> Result<(), SafeRelayError> {
        let balance = if request.gas_token.is_zero() {
            self.provider.get_balance(request.safe, None).await?
        } else {
            self.provider
                .get_token_balance(request.gas_token, request.safe, None)
                .await?
        };
        let required = request
            .safe_tx_gas
            .saturating_add(request.base_gas)
            .saturating_mul(request.gas_price);
        if balance < required {
            return Err(SafeRelayError::NotEnoughFundsForMultisigTx {
                safe: request.safe,
                balance,
                required,
            });
        }
        Ok(())
    }

    /// Gas the inner call needs, from `requiredTxGas`, plus a margin for
    /// nested calls.
    pub async fn estimate_tx_gas(
        &self,
        safe: Address,
        to: Address,
        value: U256,
        data: &Bytes,
        operation: SafeOperation,
    ) -> Result<u64, SafeRelayError> {
        let call = IGnosisSafe::requiredTxGasCall {
            to,
            value,
            data: data.clone(),
            operation: operation.as_u8(),
        };
        let request = TransactionRequest::default()
            .from(safe)
            .to(safe)
            .input(Bytes::from(call.abi_encode()).into());

        let output = match self.provider.call_contract(&request, BlockId::pending()).await {
            Ok(output) => output,
            Err(ProviderError::ExecutionReverted {
                data: Some(data), ..
            }) => data,
            Err(ProviderError::ExecutionReverted { message, .. }) => {
                return Err(SafeRelayError::GasEstimationFailed(message))
            }
            Err(e) => return Err(e.into()),
        };
        let gas = decode_required_tx_gas(&output).ok_or_else(|| {
            warn!(safe = %safe, output = %output, "unexpected requiredTxGas output");
            SafeRelayError::GasEstimationFailed(format!("unexpected requiredTxGas output {output}"))
        })?;
        Ok(gas + SAFE_TX_GAS_MARGIN)
    }

    /// Gas outside of the inner call: calldata, signatures and the refund.
    pub async fn estimate_tx_base_gas(
        &self,
        safe: Address,
        to: Address,
        value: U256,
        data: &Bytes,
        operation: SafeOperation,
        gas_token: Address,
        safe_tx_gas: u64,
    ) -> Result<u64, SafeRelayError> {
        let threshold = self.reader.threshold(safe).await?;
        let exec_data = IGnosisSafe::execTransactionCall {
            to,
            value,
            data: data.clone(),
            operation: operation.as_u8(),
            safeTxGas: U256::from(safe_tx_gas),
            baseGas: U256::ZERO,
            gasPrice: U256::from(1u64),
            gasToken: gas_token,
            refundReceiver: Address::ZERO,
            signatures: Bytes::new(),
        }
        .abi_encode();

        let mut base_gas = threshold * BASE_GAS_PER_SIGNATURE + calldata_gas(&exec_data);
        base_gas += if base_gas > BASE_GAS_LARGE_DATA_THRESHOLD {
            64
        } else {
            128
        };
        Ok(base_gas + BASE_GAS_TX_OVERHEAD)
    }

    /// Highest nonce used by `safe`: the last relayed one or the on-chain
    /// nonce minus one. `None` for a Safe that never executed anything.
    pub async fn last_used_nonce(&self, safe: Address) -> Result<Option<U256>, SafeRelayError> {
        if let Some(nonce) = self.multisig_txs.get_last_nonce(safe).await? {
            return Ok(Some(nonce));
        }
        let nonce = self.reader.nonce(safe).await.map_err(|e| {
            if e.is_transient() {
                SafeRelayError::Provider(e)
            } else {
                debug!(safe = %safe, error = %e, "cannot read safe nonce");
                SafeRelayError::SafeDoesNotExist(safe)
            }
        })?;
        Ok(nonce.checked_sub(U256::from(1u64)))
    }

    /// Gas quote for a multisig tx paid in `gas_token`.
    pub async fn estimate_tx(
        &self,
        safe: Address,
        to: Address,
        value: U256,
        data: Bytes,
        operation: SafeOperation,
        gas_token: Address,
    ) -> Result<SafeTxEstimate, SafeRelayError> {
        let token = self.gas_token(gas_token).await?;
        let last_used_nonce = self.last_used_nonce(safe).await?;
        let safe_tx_gas = self
            .estimate_tx_gas(safe, to, value, &data, operation)
            .await?;
        let base_gas = self
            .estimate_tx_base_gas(safe, to, value, &data, operation, gas_token, safe_tx_gas)
            .await?;
        let standard = self.gas_station.get_gas_prices().await?.standard;

        Ok(SafeTxEstimate {
            safe_tx_gas,
            base_gas,
            gas_price: Self::token_gas_price(token.as_ref(), standard)?,
            gas_token,
            last_used_nonce,
        })
    }

    /// Ether quote followed by one quote per priced gas token.
    pub async fn estimate_tx_for_all_tokens(
        &self,
        safe: Address,
        to: Address,
        value: U256,
        data: Bytes,
        operation: SafeOperation,
    ) -> Result<Vec<SafeTxEstimate>, SafeRelayError> {
        let ether = self
            .estimate_tx(safe, to, value, data, operation, Address::ZERO)
            .await?;
        let standard = self.gas_station.get_gas_prices().await?.standard;

        let mut estimates = vec![ether.clone()];
        for token in self.tokens.list_gas_tokens().await? {
            match token.calculate_gas_price(standard, 1.0) {
                Some(gas_price) => estimates.push(SafeTxEstimate {
                    base_gas: ether.base_gas + TOKEN_PAYMENT_EXTRA_GAS,
                    gas_price,
                    gas_token: token.address,
                    ..ether.clone()
                }),
                None => error!(token = %token.address, "cannot get price for token"),
            }
        }
        Ok(estimates)
    }

    /// Simulates `execTransaction` from the tx sender on the pending block.
    async fn simulate(&self, request: &MultisigTxRequest, exec_data: &Bytes) -> Result<(), SafeRelayError> {
        let call = TransactionRequest::default()
            .from(self.tx_sender.address())
            .to(request.safe)
            .input(exec_data.clone().into());
        let output = self
            .provider
            .call_contract(&call, BlockId::pending())
            .await
            .map_err(map_simulation_error)?;
        let success = IGnosisSafe::execTransactionCall::abi_decode_returns(&output)
            .map_err(|e| SafeRelayError::InvalidMultisigTx(format!("cannot decode result: {e}")))?;
        if !success {
            return Err(SafeRelayError::InvalidMultisigTx(
                "execTransaction returned false".into(),
            ));
        }
        Ok(())
    }

    /// Checks and relays a signed Safe transaction.
    pub async fn relay_multisig_tx(
        &self,
        request: MultisigTxRequest,
    ) -> Result<RelayedMultisigTransaction, SafeRelayError> {
        let safe = request.safe;
        let nonce = request.nonce;
        info!(safe = %safe, nonce = %nonce, "relaying multisig tx");

        let Some(reservation) = self
            .lock_manager
            .try_lock(
                &format!("multisig_tx:{safe}:{nonce}"),
                Duration::from_secs(MULTISIG_TX_RESERVATION_TTL_SECS),
            )
            .await?
        else {
            debug!(safe = %safe, nonce = %nonce, "multisig tx nonce already being relayed");
            return Err(SafeRelayError::SafeMultisigTxExists { safe, nonce });
        };
        let result = self.relay_reserved(request).await;
        reservation.release().await;
        result
    }

    async fn relay_reserved(
        &self,
        request: MultisigTxRequest,
    ) -> Result<RelayedMultisigTransaction, SafeRelayError> {
        let safe = request.safe;
        if self.multisig_txs.exists(safe, request.nonce).await? {
            return Err(SafeRelayError::SafeMultisigTxExists {
                safe,
                nonce: request.nonce,
            });
        }
        if !request.refund_receiver.is_zero() {
            return Err(SafeRelayError::InvalidRefundReceiver(request.refund_receiver));
        }
        if request.gas_price.is_zero() {
            return Err(SafeRelayError::RefundMustBeEnabled);
        }

        let threshold = self.reader.threshold(safe).await?;
        let provided = request.signatures.len() / SIGNATURE_LENGTH;
        if (provided as u64) < threshold {
            return Err(SignatureError::SignaturesNotFound {
                required: threshold as usize,
                provided,
            }
            .into());
        }

        let token = self.gas_token(request.gas_token).await?;
        self.check_gas_price(token.as_ref(), request.gas_price).await?;

        self.check_proxy_code(safe).await?;
        self.check_master_copy(safe).await?;
        self.check_funds(&request).await?;

        let safe_tx_gas_estimate = self
            .estimate_tx_gas(safe, request.to, request.value, &request.data, request.operation)
            .await?;
        let base_gas_estimate = self
            .estimate_tx_base_gas(
                safe,
                request.to,
                request.value,
                &request.data,
                request.operation,
                request.gas_token,
                safe_tx_gas_estimate,
            )
            .await?;
        if request.safe_tx_gas < U256::from(safe_tx_gas_estimate)
            || request.base_gas < U256::from(base_gas_estimate)
        {
            return Err(SafeRelayError::InvalidGasEstimation {
                safe_tx_gas: request.safe_tx_gas,
                base_gas: request.base_gas,
                estimated_safe_tx_gas: safe_tx_gas_estimate,
                estimated_base_gas: base_gas_estimate,
            });
        }

        let version = self.reader.version(safe).await?;
        let safe_tx_hash = compute_safe_tx_hash(safe, &SafeTx::from(&request), version, self.chain_id);
        recover_signers(safe_tx_hash, &request.signatures)?;

        let exec_data: Bytes = IGnosisSafe::execTransactionCall {
            to: request.to,
            value: request.value,
            data: request.data.clone(),
            operation: request.operation.as_u8(),
            safeTxGas: request.safe_tx_gas,
            baseGas: request.base_gas,
            gasPrice: request.gas_price,
            gasToken: request.gas_token,
            refundReceiver: request.refund_receiver,
            signatures: request.signatures.clone(),
        }
        .abi_encode()
        .into();
        self.simulate(&request, &exec_data).await?;

        let tx_gas = request
            .safe_tx_gas
            .saturating_add(request.base_gas)
            .saturating_mul(U256::from(2u64))
            .saturating_to::<u64>();
        let tx_gas_price = self.gas_station.get_gas_prices().await?.fast;
        let sent = self
            .tx_sender
            .send(TransactionParams {
                to: TxKind::Call(safe),
                value: U256::ZERO,
                input: exec_data,
                gas_limit: tx_gas,
                gas_price: tx_gas_price,
            })
            .await?;
        info!(
            safe = %safe,
            nonce = %request.nonce,
            safe_tx_hash = %safe_tx_hash,
            tx_hash = %sent.hash,
            "multisig tx relayed"
        );

        let relayed = RelayedMultisigTransaction {
            safe,
            to: request.to,
            value: request.value,
            data: request.data,
            operation: request.operation,
            safe_tx_gas: request.safe_tx_gas,
            base_gas: request.base_gas,
            gas_price: request.gas_price,
            gas_token: request.gas_token,
            refund_receiver: request.refund_receiver,
            nonce: request.nonce,
            signatures: request.signatures,
            safe_tx_hash,
            tx_hash: sent.hash,
            tx_nonce: sent.nonce,
            tx_gas,
            tx_gas_price: sent.gas_price,
            created_at: now_rfc3339(),
        };
        self.multisig_txs.create(relayed).await.map_err(|e| match e {
            RepositoryError::ConstraintViolation(_) => SafeRelayError::SafeMultisigTxExists {
                safe,
                nonce: request.nonce,
            },
            other => other.into(),
        })
    }
}
