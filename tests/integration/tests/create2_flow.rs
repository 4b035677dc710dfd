//! CREATE2 Safe creation from prediction to confirmation.

use std::time::Duration;

use alloy::primitives::U256;
use safe_relay_service::{
    domain::safe::predict_safe_address,
    jobs::{process_job, JobOutcome, SafeJob},
    models::SafeRelayError,
    repositories::SafeDeploymentRepositoryTrait,
};

use crate::integration::common::{
    context::{TestContext, FALLBACK_HANDLER, MASTER_COPY, PROXY_FACTORY},
    fake_chain::GENESIS_BLOCK,
    owners::owner,
};

const SALT_NONCE: u64 = 17051863;

#[tokio::test]
async fn test_create2_safe_is_predicted_funded_deployed_and_confirmed() {
    let ctx = TestContext::new().await;
    let owners = vec![owner(1).address(), owner(2).address()];
    let request = TestContext::creation_request(owners.clone(), 2, SALT_NONCE);

    let intent = ctx.state.creation.create2_safe_tx(request.clone()).await.unwrap();
    assert_eq!(intent.master_copy, MASTER_COPY);
    assert_eq!(intent.proxy_factory, PROXY_FACTORY);
    assert_eq!(intent.payment_receiver, ctx.funder);
    assert!(intent.payment > U256::ZERO);
    // Prediction moves no funds
    assert_eq!(ctx.chain.transaction_count(), 0);
    assert_eq!(
        predict_safe_address(
            PROXY_FACTORY,
            MASTER_COPY,
            &ctx.state.contracts.proxy_creation_code,
            &intent.setup_data,
            U256::from(SALT_NONCE),
        ),
        intent.safe
    );
    assert_eq!(ctx.state.contracts.fallback_handler, FALLBACK_HANDLER);

    // Nothing is sent before the Safe holds its payment
    let unfunded = ctx.state.creation.deploy_create2_safe_tx(intent.safe).await;
    assert!(matches!(
        unfunded,
        Err(SafeRelayError::NotEnoughFundingForCreation { safe, .. }) if safe == intent.safe
    ));
    assert_eq!(ctx.chain.transaction_count(), 0);

    ctx.chain.set_balance(intent.safe, intent.payment);
    let funder_balance = ctx.chain.balance(ctx.funder);
    let deployed = ctx
        .state
        .creation
        .deploy_create2_safe_tx(intent.safe)
        .await
        .unwrap();
    let tx_hash = deployed.tx_hash.unwrap();

    let txs = ctx.chain.transactions();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].hash, tx_hash);
    assert_eq!(txs[0].from, ctx.funder);
    assert_eq!(txs[0].to, Some(PROXY_FACTORY));
    assert_eq!(txs[0].gas_price, intent.gas_price_estimated);
    assert!(txs[0].status);
    // The factory deployed the proxy where it was predicted and the Safe paid
    // the funder back out of its own balance
    assert_eq!(ctx.chain.code(intent.safe), ctx.state.contracts.proxy_runtime_code.clone().unwrap());
    assert_eq!(ctx.chain.balance(intent.safe), U256::ZERO);
    assert_eq!(ctx.chain.balance(ctx.funder), funder_balance + intent.payment);

    // Same owners and salt again
    let again = ctx.state.creation.create2_safe_tx(request).await;
    assert!(matches!(again, Err(SafeRelayError::SafeAlreadyExists(safe)) if safe == intent.safe));

    // A second deploy keeps the first tx
    let redeployed = ctx
        .state
        .creation
        .deploy_create2_safe_tx(intent.safe)
        .await
        .unwrap();
    assert_eq!(redeployed.tx_hash, Some(tx_hash));
    assert_eq!(ctx.chain.transaction_count(), 1);

    let confirmed = ctx
        .state
        .create2_reconciler
        .check_pending_deployments()
        .await
        .unwrap();
    assert_eq!(confirmed, 1);
    let stored = ctx.state.deployments.get_by_address(intent.safe).await.unwrap();
    assert_eq!(stored.confirmed_block, Some(GENESIS_BLOCK + 1));

    let info = ctx.state.creation.retrieve_safe_info(intent.safe).await.unwrap();
    assert_eq!(info.threshold, 2);
    assert_eq!(info.owners, owners);
    assert_eq!(info.master_copy, MASTER_COPY);
}

#[tokio::test]
async fn test_periodic_pass_deploys_only_funded_safes() {
    let ctx = TestContext::new().await;
    let funded = ctx
        .state
        .creation
        .create2_safe_tx(TestContext::creation_request(vec![owner(1).address()], 1, 1))
        .await
        .unwrap();
    let unfunded = ctx
        .state
        .creation
        .create2_safe_tx(TestContext::creation_request(vec![owner(2).address()], 1, 2))
        .await
        .unwrap();
    ctx.chain.set_balance(funded.safe, funded.payment);

    let deployed = ctx.state.creation.deploy_funded_safes().await.unwrap();
    assert_eq!(deployed, 1);
    assert!(!ctx.chain.code(funded.safe).is_empty());
    assert!(ctx.chain.code(unfunded.safe).is_empty());

    let pending = ctx.state.deployments.list_pending_deploy().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].safe, unfunded.safe);
}

#[tokio::test]
async fn test_deploy_job_is_retried_until_safe_is_funded() {
    let mut ctx = TestContext::new().await;
    let intent = ctx
        .state
        .creation
        .create2_safe_tx(TestContext::creation_request(vec![owner(3).address()], 1, 3))
        .await
        .unwrap();

    ctx.state.request_create2_deployment(intent.safe).await.unwrap();
    let job = ctx.receiver.recv().await.unwrap();
    assert_eq!(job.data, SafeJob::DeployCreate2Safe { safe: intent.safe });

    let outcome = process_job(ctx.state.clone(), job).await;
    assert!(matches!(outcome, JobOutcome::Retry(_)));
    assert_eq!(ctx.chain.transaction_count(), 0);

    // The requeued attempt arrives after its backoff
    let retried = tokio::time::timeout(Duration::from_secs(5), ctx.receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(retried.attempt, 1);

    ctx.chain.set_balance(intent.safe, intent.payment);
    assert_eq!(process_job(ctx.state.clone(), retried).await, JobOutcome::Completed);
    assert_eq!(ctx.chain.transaction_count(), 1);
    assert!(!ctx.chain.code(intent.safe).is_empty());
}
