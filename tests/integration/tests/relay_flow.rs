//! Relaying signed multisig transactions of a deployed Safe.

use alloy::primitives::{Address, Bytes, U256};
use safe_relay_service::{
    constants::GWEI,
    domain::safe::{compute_safe_tx_hash, SafeTx},
    models::{MultisigTxRequest, SafeOperation, SafeRelayError, SafeVersion, SignatureError},
    repositories::MultisigTxRepositoryTrait,
};

use crate::integration::common::{
    context::{ether, TestContext},
    fake_chain::{CHAIN_ID, REQUIRED_TX_GAS},
    owners::{sign, sorted_owners},
};

const RECIPIENT: Address = Address::repeat_byte(0x70);

/// A Safe owned by two sorted owners with a threshold of 2, holding 1 ether.
async fn funded_safe(ctx: &TestContext) -> Address {
    let owners = sorted_owners(2).iter().map(|o| o.address()).collect();
    let safe = ctx.deploy_safe(owners, 2, 42).await;
    ctx.chain.set_balance(safe, ether(1));
    safe
}

fn request(safe: Address, gas_price: u128) -> MultisigTxRequest {
    MultisigTxRequest {
        safe,
        to: RECIPIENT,
        value: U256::from(1_000u64),
        data: Bytes::new(),
        operation: SafeOperation::Call,
        safe_tx_gas: U256::from(100_000u64),
        base_gas: U256::from(100_000u64),
        gas_price: U256::from(gas_price),
        gas_token: Address::ZERO,
        refund_receiver: Address::ZERO,
        nonce: U256::ZERO,
        signatures: Bytes::new(),
    }
}

fn signed(mut request: MultisigTxRequest) -> MultisigTxRequest {
    let hash = compute_safe_tx_hash(
        request.safe,
        &SafeTx::from(&request),
        SafeVersion::V1_1_1,
        CHAIN_ID,
    );
    request.signatures = sign(&sorted_owners(2), hash);
    request
}

#[tokio::test]
async fn test_relay_executes_signed_multisig_tx() {
    let ctx = TestContext::new().await;
    let safe = funded_safe(&ctx).await;
    let sent_before = ctx.chain.transaction_count();

    let relayed = ctx
        .state
        .relay
        .relay_multisig_tx(signed(request(safe, 12 * GWEI)))
        .await
        .unwrap();

    let txs = ctx.chain.transactions();
    assert_eq!(txs.len(), sent_before + 1);
    let tx = txs.last().unwrap();
    assert_eq!(tx.hash, relayed.tx_hash);
    assert_eq!(tx.from, ctx.tx_sender);
    assert_eq!(tx.to, Some(safe));
    assert!(tx.status);
    // Outer tx pays the fast price with twice the inner gas
    assert_eq!(tx.gas_price, 13 * GWEI);
    assert_eq!(tx.gas_limit, 400_000);
    assert_eq!(relayed.tx_gas_price, 13 * GWEI);

    assert_eq!(ctx.chain.balance(RECIPIENT), U256::from(1_000u64));
    assert_eq!(ctx.chain.safe_nonce(safe), Some(U256::from(1u64)));
    let stored = ctx.state.multisig_txs.get(safe, U256::ZERO).await.unwrap();
    assert_eq!(stored, relayed);
    assert_eq!(
        ctx.state.relay.last_used_nonce(safe).await.unwrap(),
        Some(U256::ZERO)
    );
}

#[tokio::test]
async fn test_relay_with_gas_price_below_standard_is_rejected() {
    let ctx = TestContext::new().await;
    let safe = funded_safe(&ctx).await;
    let sent_before = ctx.chain.transaction_count();

    let result = ctx
        .state
        .relay
        .relay_multisig_tx(signed(request(safe, 5 * GWEI)))
        .await;

    assert!(matches!(
        result,
        Err(SafeRelayError::GasPriceTooLow { required, provided })
            if required == U256::from(12 * GWEI) && provided == U256::from(5 * GWEI)
    ));
    assert_eq!(ctx.chain.transaction_count(), sent_before);
    assert!(!ctx.state.multisig_txs.exists(safe, U256::ZERO).await.unwrap());
    assert_eq!(ctx.chain.safe_nonce(safe), Some(U256::ZERO));
}

#[tokio::test]
async fn test_relay_same_nonce_twice_sends_once() {
    let ctx = TestContext::new().await;
    let safe = funded_safe(&ctx).await;
    let tx = signed(request(safe, 12 * GWEI));

    ctx.state.relay.relay_multisig_tx(tx.clone()).await.unwrap();
    let sent = ctx.chain.transaction_count();

    let result = ctx.state.relay.relay_multisig_tx(tx).await;
    assert!(matches!(
        result,
        Err(SafeRelayError::SafeMultisigTxExists { safe: s, nonce }) if s == safe && nonce.is_zero()
    ));
    assert_eq!(ctx.chain.transaction_count(), sent);
}

#[tokio::test]
async fn test_relay_requires_threshold_signatures() {
    let ctx = TestContext::new().await;
    let safe = funded_safe(&ctx).await;
    let sent_before = ctx.chain.transaction_count();

    let mut tx = signed(request(safe, 12 * GWEI));
    tx.signatures = tx.signatures.slice(..65);
    let result = ctx.state.relay.relay_multisig_tx(tx).await;

    assert!(matches!(
        result,
        Err(SafeRelayError::Signature(SignatureError::SignaturesNotFound {
            required: 2,
            provided: 1
        }))
    ));
    assert_eq!(ctx.chain.transaction_count(), sent_before);
}

#[tokio::test]
async fn test_estimate_tx_quotes_standard_price() {
    let ctx = TestContext::new().await;
    let safe = funded_safe(&ctx).await;

    let estimate = ctx
        .state
        .relay
        .estimate_tx(
            safe,
            RECIPIENT,
            U256::from(1_000u64),
            Bytes::new(),
            SafeOperation::Call,
            Address::ZERO,
        )
        .await
        .unwrap();

    assert_eq!(estimate.gas_price, 12 * GWEI);
    assert!(estimate.safe_tx_gas > REQUIRED_TX_GAS);
    assert!(estimate.base_gas > 0);
    assert_eq!(estimate.gas_token, Address::ZERO);
    // Fresh Safe, nothing executed yet
    assert_eq!(estimate.last_used_nonce, None);
}
