//! # Safe Creation
//!
//! Prices, predicts and deploys new Safes. CREATE2 intents are deployed by
//! the funder through the proxy factory once the predicted address holds the
//! payment. Legacy creations are handed to the two-phase reconciler.
use std::sync::Arc;

use alloy::{
    primitives::{Address, Bytes, TxKind, U256},
    rpc::types::TransactionRequest,
    sol_types::SolCall,
};
use futures::future::try_join_all;
use tracing::{debug, error, info};

use crate::constants::{
    CREATION_PAYMENT_GAS_OVERHEAD, TOKEN_PAYMENT_EXTRA_GAS, TOKEN_SETUP_TRANSFER_GAS,
};
use crate::domain::reconciler::try_safe_step_lock;
use crate::domain::safe::{
    build_legacy_creation, build_setup_data, contracts::IProxyFactory, predict_safe_address,
    LegacyCreationParams, SafeReader, SetupParams,
};
use crate::models::{
    LegacyCreationRequest, LegacySafeCreation, RepositoryError, SafeContracts,
    SafeCreation2Request, SafeCreationEstimate, SafeDeploymentIntent, SafeInfo, SafeRelayError,
    Token, TxSubmission,
};
use crate::repositories::{
    LegacyFundingRepositoryStorage, LegacyFundingRepositoryTrait, SafeDeploymentRepositoryStorage,
    SafeDeploymentRepositoryTrait, TokenRepositoryStorage, TokenRepositoryTrait,
};
use crate::services::{
    EvmProviderTrait, GasStationService, GasStationTrait, ProviderError, TransactionParams,
    TransactionSender,
};
use crate::utils::{now_rfc3339, LockManager};

const DEPLOY_CREATE2_STEP: &str = "deploy_create2_safe";

/// Factory call deploying `intent`. Replacements only change the gas price.
pub fn deployment_tx_params(intent: &SafeDeploymentIntent, gas_price: u128) -> TransactionParams {
    let call = IProxyFactory::createProxyWithNonceCall {
        _mastercopy: intent.master_copy,
        initializer: intent.setup_data.clone(),
        saltNonce: intent.salt_nonce,
    };
    TransactionParams {
        to: TxKind::Call(intent.proxy_factory),
        value: U256::ZERO,
        input: call.abi_encode().into(),
        gas_limit: intent.gas_estimated,
        gas_price,
    }
}

pub struct SafeCreationService<P: EvmProviderTrait> {
    provider: Arc<P>,
    contracts: Arc<SafeContracts>,
    deployments: Arc<SafeDeploymentRepositoryStorage>,
    legacy: Arc<LegacyFundingRepositoryStorage>,
    tokens: Arc<TokenRepositoryStorage>,
    gas_station: Arc<GasStationService<P>>,
    funder: Arc<TransactionSender<P>>,
    lock_manager: LockManager,
    reader: SafeReader<P>,
    fixed_creation_cost: Option<U256>,
}

#[allow(clippy::too_many_arguments)]
impl<P: EvmProviderTrait> SafeCreationService<P> {
    pub fn new(
        provider: Arc<P>,
        contracts: Arc<SafeContracts>,
        deployments: Arc<SafeDeploymentRepositoryStorage>,
        legacy: Arc<LegacyFundingRepositoryStorage>,
        tokens: Arc<TokenRepositoryStorage>,
        gas_station: Arc<GasStationService<P>>,
        funder: Arc<TransactionSender<P>>,
        lock_manager: LockManager,
        fixed_creation_cost: Option<U256>,
    ) -> Self {
        let reader = SafeReader::new(provider.clone(), contracts.default_version);
        Self {
            provider,
            contracts,
            deployments,
            legacy,
            tokens,
            gas_station,
            funder,
            lock_manager,
            reader,
            fixed_creation_cost,
        }
    }

    /// Registered gas token for `address`, `None` for ether.
    async fn resolve_payment_token(
        &self,
        address: Option<Address>,
    ) -> Result<Option<Token>, SafeRelayError> {
        let Some(address) = address.filter(|a| !a.is_zero()) else {
            return Ok(None);
        };
        let token = self
            .tokens
            .get_gas_token(address)
            .await?
            .ok_or(SafeRelayError::InvalidPaymentToken(address))?;
        if token.eth_value().is_none() {
            return Err(SafeRelayError::CannotGetTokenPrice(address));
        }
        Ok(Some(token))
    }

    fn calculate_payment(
        &self,
        gas: u64,
        gas_price: u128,
        token: Option<&Token>,
    ) -> Result<U256, SafeRelayError> {
        if let Some(fixed) = self.fixed_creation_cost {
            return Ok(fixed);
        }
        let payment_ether =
            U256::from(gas + CREATION_PAYMENT_GAS_OVERHEAD) * U256::from(gas_price);
        match token {
            Some(token) => token
                .calculate_payment(payment_ether)
                .ok_or(SafeRelayError::CannotGetTokenPrice(token.address)),
            None => Ok(payment_ether),
        }
    }

    async fn estimate_gas(&self, request: TransactionRequest) -> Result<u64, SafeRelayError> {
        self.provider
            .estimate_gas(&request)
            .await
            .map_err(|e| match e {
                ProviderError::ExecutionReverted { message, .. } => {
                    SafeRelayError::GasEstimationFailed(message)
                }
                other => SafeRelayError::Provider(other),
            })
    }

    /// Gas of `createProxyWithNonce` plus the payment transfer done by `setup`.
    async fn estimate_creation_gas(
        &self,
        setup: &SetupParams,
        salt_nonce: U256,
    ) -> Result<u64, SafeRelayError> {
        // Payment is irrelevant for the estimate and the Safe holds nothing yet
        let initializer = build_setup_data(&SetupParams {
            payment: U256::ZERO,
            ..setup.clone()
        });
        let call = IProxyFactory::createProxyWithNonceCall {
            _mastercopy: self.contracts.master_copy,
            initializer,
            saltNonce: salt_nonce,
        };
        let gas = self
            .estimate_gas(
                TransactionRequest::default()
                    .from(self.funder.address())
                    .to(self.contracts.proxy_factory)
                    .input(Bytes::from(call.abi_encode()).into()),
            )
            .await?;

        let payment_gas = if setup.payment_token.is_zero() {
            self.estimate_gas(
                TransactionRequest::default()
                    .from(self.funder.address())
                    .to(setup.payment_receiver)
                    .value(U256::from(1u64)),
            )
            .await?
        } else {
            TOKEN_SETUP_TRANSFER_GAS
        };
        Ok(gas + payment_gas)
    }

    /// Stored intent of an earlier request with the same owners and salt.
    pub async fn get_existing_prediction(
        &self,
        owners: Vec<Address>,
        salt_nonce: U256,
    ) -> Result<Option<SafeDeploymentIntent>, SafeRelayError> {
        Ok(self
            .deployments
            .get_by_owners_and_salt(owners, salt_nonce)
            .await?)
    }

    /// Prices and predicts a CREATE2 Safe. No funds move.
    pub async fn create2_safe_tx(
        &self,
        request: SafeCreation2Request,
    ) -> Result<SafeDeploymentIntent, SafeRelayError> {
        request.validate()?;
        if let Some(existing) = self
            .get_existing_prediction(request.owners.clone(), request.salt_nonce)
            .await?
        {
            return Err(SafeRelayError::SafeAlreadyExists(existing.safe));
        }

        let token = self.resolve_payment_token(request.payment_token()).await?;
        let gas_price = self.gas_station.get_gas_prices().await?.fast;
        let funder = self.funder.address();

        let mut setup = SetupParams {
            owners: request.owners.clone(),
            threshold: request.threshold,
            to: request.to.unwrap_or(Address::ZERO),
            data: request.setup_data.clone().unwrap_or_default(),
            fallback_handler: self.contracts.fallback_handler,
            payment_token: token.as_ref().map(|t| t.address).unwrap_or(Address::ZERO),
            payment: U256::ZERO,
            payment_receiver: funder,
        };
        let gas = self.estimate_creation_gas(&setup, request.salt_nonce).await?;
        setup.payment = self.calculate_payment(gas, gas_price, token.as_ref())?;

        let setup_data = build_setup_data(&setup);
        let safe = predict_safe_address(
            self.contracts.proxy_factory,
            self.contracts.master_copy,
            &self.contracts.proxy_creation_code,
            &setup_data,
            request.salt_nonce,
        );
        if self.reader.is_contract(safe).await? {
            return Err(SafeRelayError::SafeAlreadyExists(safe));
        }

        let intent = SafeDeploymentIntent {
            safe,
            master_copy: self.contracts.master_copy,
            proxy_factory: self.contracts.proxy_factory,
            salt_nonce: request.salt_nonce,
            owners: request.owners,
            threshold: request.threshold,
            to: request.to,
            payment_token: token.map(|t| t.address),
            payment: setup.payment,
            payment_receiver: funder,
            setup_data,
            gas_estimated: gas,
            gas_price_estimated: gas_price,
            tx_hash: None,
            tx_nonce: None,
            tx_gas_price: None,
            tx_submitted_at: None,
            submitted_tx_hashes: Vec::new(),
            code_seen_block: None,
            confirmed_block: None,
            created_at: now_rfc3339(),
        };

        let intent = self.deployments.create(intent).await.map_err(|e| match e {
            RepositoryError::ConstraintViolation(_) => SafeRelayError::SafeAlreadyExists(safe),
            other => other.into(),
        })?;
        info!(
            safe = %intent.safe,
            salt_nonce = %intent.salt_nonce,
            payment = %intent.payment,
            gas = intent.gas_estimated,
            gas_price = intent.gas_price_estimated,
            "safe creation predicted"
        );
        Ok(intent)
    }

    /// Balance `safe` holds in the currency it pays its creation with.
    async fn creation_balance(&self, intent: &SafeDeploymentIntent) -> Result<U256, SafeRelayError> {
        let balance = match intent.payment_token() {
            Some(token) => {
                self.provider
                    .get_token_balance(token, intent.safe, None)
                    .await?
            }
            None => self.provider.get_balance(intent.safe, None).await?,
        };
        Ok(balance)
    }

    /// Deploys a predicted Safe once it holds its payment.
    ///
    /// A Safe whose deployment tx was already sent is returned untouched. A
    /// deployment running elsewhere for the same Safe fails with the
    /// transient `StepInProgress`.
    pub async fn deploy_create2_safe_tx(
        &self,
        safe: Address,
    ) -> Result<SafeDeploymentIntent, SafeRelayError> {
        let Some(guard) = try_safe_step_lock(&self.lock_manager, DEPLOY_CREATE2_STEP, safe).await?
        else {
            debug!(safe = %safe, "safe deployment already running");
            return Err(SafeRelayError::StepInProgress {
                step: DEPLOY_CREATE2_STEP.to_string(),
                safe,
            });
        };
        let result = self.deploy_create2_locked(safe).await;
        guard.release().await;
        result
    }

    async fn deploy_create2_locked(
        &self,
        safe: Address,
    ) -> Result<SafeDeploymentIntent, SafeRelayError> {
        let intent = self.deployments.get_by_address(safe).await?;
        if let Some(tx_hash) = intent.tx_hash {
            info!(safe = %safe, tx_hash = %tx_hash, "safe deployment already sent");
            return Ok(intent);
        }

        let balance = self.creation_balance(&intent).await?;
        if balance < intent.payment {
            debug!(
                safe = %safe,
                balance = %balance,
                payment = %intent.payment,
                "safe not funded yet"
            );
            return Err(SafeRelayError::NotEnoughFundingForCreation {
                safe,
                balance,
                payment: intent.payment,
            });
        }
        info!(safe = %safe, balance = %balance, payment = %intent.payment, "safe funded, deploying");

        let sent = self
            .funder
            .send(deployment_tx_params(&intent, intent.gas_price_estimated))
            .await?;

        let intent = self
            .deployments
            .set_tx_submission(
                safe,
                TxSubmission {
                    tx_hash: sent.hash,
                    nonce: sent.nonce,
                    gas_price: sent.gas_price,
                    submitted_at: now_rfc3339(),
                },
            )
            .await?;
        info!(safe = %safe, tx_hash = %sent.hash, nonce = sent.nonce, "safe deployment sent");
        Ok(intent)
    }

    /// Price of a CREATE2 Safe with `number_owners` owners.
    pub async fn estimate_safe_creation2(
        &self,
        number_owners: usize,
        payment_token: Option<Address>,
    ) -> Result<SafeCreationEstimate, SafeRelayError> {
        if number_owners == 0 {
            return Err(SafeRelayError::InvalidOwners(
                "at least one owner is required".into(),
            ));
        }
        let token = self.resolve_payment_token(payment_token).await?;
        let gas_price = self.gas_station.get_gas_prices().await?.fast;

        let owners: Vec<Address> = (1..=number_owners as u64)
            .map(|i| Address::left_padding_from(&i.to_be_bytes()))
            .collect();
        let setup = SetupParams {
            threshold: owners.len() as u64,
            owners,
            fallback_handler: self.contracts.fallback_handler,
            payment_token: token.as_ref().map(|t| t.address).unwrap_or(Address::ZERO),
            payment_receiver: self.funder.address(),
            ..Default::default()
        };
        let salt_nonce = U256::from(rand::random::<u64>());
        let gas = self.estimate_creation_gas(&setup, salt_nonce).await?;
        let payment = self.calculate_payment(gas, gas_price, token.as_ref())?;

        Ok(SafeCreationEstimate {
            gas,
            gas_price,
            payment,
            payment_token: setup.payment_token,
        })
    }

    /// Ether estimate followed by one estimate per gas token that has a price.
    pub async fn estimate_safe_creation_for_all_tokens(
        &self,
        number_owners: usize,
    ) -> Result<Vec<SafeCreationEstimate>, SafeRelayError> {
        let ether = self.estimate_safe_creation2(number_owners, None).await?;
        let mut estimates = vec![ether.clone()];
        for token in self.tokens.list_gas_tokens().await? {
            match token.calculate_payment(ether.payment) {
                Some(payment) => estimates.push(SafeCreationEstimate {
                    gas: ether.gas + TOKEN_PAYMENT_EXTRA_GAS,
                    gas_price: ether.gas_price,
                    payment,
                    payment_token: token.address,
                }),
                None => error!(token = %token.address, "cannot get price for token"),
            }
        }
        Ok(estimates)
    }

    pub async fn retrieve_safe_info(&self, safe: Address) -> Result<SafeInfo, SafeRelayError> {
        self.reader.safe_info(safe).await
    }

    /// Plans a Safe deployed through a one-shot deployer.
    pub async fn create_safe_tx(
        &self,
        request: LegacyCreationRequest,
    ) -> Result<LegacySafeCreation, SafeRelayError> {
        request.validate()?;
        let paying_proxy_code = self.contracts.paying_proxy_code.as_ref().ok_or_else(|| {
            SafeRelayError::LegacyCreationUnavailable("SAFE_PAYING_PROXY_CODE is not set".into())
        })?;
        let master_copy = self
            .contracts
            .legacy_master_copy
            .unwrap_or(self.contracts.master_copy);

        let token = self.resolve_payment_token(request.payment_token()).await?;
        let gas_price = self.gas_station.get_gas_prices().await?.fast;

        let creation = build_legacy_creation(LegacyCreationParams {
            s: request.s,
            owners: request.owners,
            threshold: request.threshold,
            master_copy,
            paying_proxy_code,
            funder: Some(self.funder.address()),
            payment_token: token.as_ref(),
            fixed_creation_cost: self.fixed_creation_cost,
            gas_price,
        })?;

        let safe = creation.safe;
        let creation = self
            .legacy
            .create_creation(creation)
            .await
            .map_err(|e| match e {
                RepositoryError::ConstraintViolation(_) => SafeRelayError::SafeAlreadyExists(safe),
                other => other.into(),
            })?;
        info!(
            safe = %creation.safe,
            deployer = %creation.deployer,
            payment = %creation.payment,
            "legacy safe creation planned"
        );
        Ok(creation)
    }

    /// Funded CREATE2 intents get deployed; unfunded ones wait for the next pass.
    pub async fn deploy_funded_safes(&self) -> Result<usize, SafeRelayError> {
        let pending = self.deployments.list_pending_deploy().await?;
        let results = try_join_all(pending.iter().map(|intent| async move {
            match self.deploy_create2_safe_tx(intent.safe).await {
                Ok(_) => Ok(true),
                Err(SafeRelayError::NotEnoughFundingForCreation { .. })
                | Err(SafeRelayError::StepInProgress { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }))
        .await?;
        Ok(results.into_iter().filter(|deployed| *deployed).count())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::models::SafeVersion;
    use crate::services::transaction::test_support::{sender_with_lock, TEST_SENDER_KEY};
    use crate::services::{FixedGasStation, MockEvmProviderTrait};
    use alloy::primitives::{address, bytes};

    pub fn test_contracts() -> SafeContracts {
        SafeContracts {
            master_copy: address!("0x34CfAC646f301356fAa8B21e94227e3583Fe3F5F"),
            legacy_master_copy: Some(address!("0xb6029EA3B2c51D09a50B53CA8012FeEB05bDa35A")),
            valid_master_copies: vec![
                address!("0x34CfAC646f301356fAa8B21e94227e3583Fe3F5F"),
                address!("0xb6029EA3B2c51D09a50B53CA8012FeEB05bDa35A"),
            ],
            proxy_factory: address!("0x76E2cFc1F5Fa8F6a5b3fC4c8F4788F0116861F9B"),
            fallback_handler: address!("0xd5D82B6aDDc9027B22dCA772Aa68D5d74cdBdF44"),
            proxy_creation_code: bytes!("608060405234801561001057600080fd5b50"),
            proxy_runtime_code: Some(bytes!("6080604052")),
            paying_proxy_code: Some(bytes!("60806040526040")),
            default_version: SafeVersion::V1_1_1,
        }
    }

    pub struct CreationFixture {
        pub service: SafeCreationService<MockEvmProviderTrait>,
        pub deployments: Arc<SafeDeploymentRepositoryStorage>,
        pub legacy: Arc<LegacyFundingRepositoryStorage>,
        pub tokens: Arc<TokenRepositoryStorage>,
    }

    pub fn creation_service(provider: MockEvmProviderTrait) -> CreationFixture {
        let provider = Arc::new(provider);
        let deployments = Arc::new(SafeDeploymentRepositoryStorage::new_in_memory());
        let legacy = Arc::new(LegacyFundingRepositoryStorage::new_in_memory());
        let tokens = Arc::new(TokenRepositoryStorage::new_in_memory());
        let service = SafeCreationService::new(
            provider.clone(),
            Arc::new(test_contracts()),
            deployments.clone(),
            legacy.clone(),
            tokens.clone(),
            Arc::new(GasStationService::Fixed(FixedGasStation::new(None))),
            Arc::new(sender_with_lock(provider, TEST_SENDER_KEY)),
            LockManager::new_in_memory(),
            None,
        );
        CreationFixture {
            service,
            deployments,
            legacy,
            tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::constants::GWEI;
    use crate::repositories::create_test_token;
    use crate::services::MockEvmProviderTrait;
    use alloy::primitives::{keccak256, B256};

    const PROXY_GAS: u64 = 250_000;
    const TRANSFER_GAS: u64 = 21_000;

    fn owners() -> Vec<Address> {
        vec![Address::repeat_byte(0x0a), Address::repeat_byte(0x0b)]
    }

    fn request() -> SafeCreation2Request {
        SafeCreation2Request {
            salt_nonce: U256::from(17051863u64),
            owners: owners(),
            threshold: 2,
            payment_token: None,
            setup_data: None,
            to: None,
        }
    }

    /// Chain with nothing deployed and fixed gas estimates.
    fn estimating_provider() -> MockEvmProviderTrait {
        let mut provider = MockEvmProviderTrait::new();
        provider.expect_estimate_gas().returning(|request| {
            let gas = if request.value.is_some() {
                TRANSFER_GAS
            } else {
                PROXY_GAS
            };
            Box::pin(async move { Ok(gas) })
        });
        provider
            .expect_get_code()
            .returning(|_| Box::pin(async { Ok(Bytes::new()) }));
        provider
    }

    #[tokio::test]
    async fn test_create2_safe_tx_prices_and_predicts() {
        let fixture = creation_service(estimating_provider());
        let intent = fixture.service.create2_safe_tx(request()).await.unwrap();

        // Fixed gas station: fast is 20 gwei
        let gas = PROXY_GAS + TRANSFER_GAS;
        assert_eq!(intent.gas_estimated, gas);
        assert_eq!(intent.gas_price_estimated, 20 * GWEI);
        assert_eq!(
            intent.payment,
            U256::from(gas + 23_000) * U256::from(20 * GWEI)
        );
        assert_eq!(intent.payment_token, None);

        let contracts = test_contracts();
        assert_eq!(
            intent.safe,
            predict_safe_address(
                contracts.proxy_factory,
                contracts.master_copy,
                &contracts.proxy_creation_code,
                &intent.setup_data,
                intent.salt_nonce,
            )
        );
        assert_eq!(
            fixture.deployments.get_by_address(intent.safe).await.unwrap(),
            intent
        );
    }

    #[tokio::test]
    async fn test_create2_safe_tx_twice_conflicts() {
        let fixture = creation_service(estimating_provider());
        let intent = fixture.service.create2_safe_tx(request()).await.unwrap();

        let result = fixture.service.create2_safe_tx(request()).await;
        assert!(matches!(result, Err(SafeRelayError::SafeAlreadyExists(safe)) if safe == intent.safe));

        let existing = fixture
            .service
            .get_existing_prediction(owners(), U256::from(17051863u64))
            .await
            .unwrap();
        assert_eq!(existing, Some(intent));
    }

    #[tokio::test]
    async fn test_create2_safe_tx_rejects_unknown_token() {
        let fixture = creation_service(estimating_provider());
        let mut req = request();
        req.payment_token = Some(Address::repeat_byte(0x77));
        assert!(matches!(
            fixture.service.create2_safe_tx(req).await,
            Err(SafeRelayError::InvalidPaymentToken(_))
        ));
    }

    #[tokio::test]
    async fn test_create2_safe_tx_with_token() {
        let fixture = creation_service(estimating_provider());
        let token = create_test_token(Address::repeat_byte(0x77), true);
        fixture.tokens.upsert(token.clone()).await.unwrap();

        let mut req = request();
        req.payment_token = Some(token.address);
        let intent = fixture.service.create2_safe_tx(req).await.unwrap();

        let gas = PROXY_GAS + TOKEN_SETUP_TRANSFER_GAS;
        assert_eq!(intent.gas_estimated, gas);
        assert_eq!(intent.payment_token, Some(token.address));
        // Token worth half an ether: twice as many units
        assert_eq!(
            intent.payment,
            U256::from(gas + 23_000) * U256::from(20 * GWEI) * U256::from(2u64)
        );
    }

    #[tokio::test]
    async fn test_create2_safe_tx_validates_request() {
        let fixture = creation_service(MockEvmProviderTrait::new());
        let mut req = request();
        req.threshold = 3;
        assert!(matches!(
            fixture.service.create2_safe_tx(req).await,
            Err(SafeRelayError::InvalidThreshold { .. })
        ));
    }

    #[tokio::test]
    async fn test_deploy_requires_funding() {
        let mut provider = estimating_provider();
        provider
            .expect_get_balance()
            .returning(|_, _| Box::pin(async { Ok(U256::from(1u64)) }));
        provider.expect_send_raw_transaction().never();

        let fixture = creation_service(provider);
        let intent = fixture.service.create2_safe_tx(request()).await.unwrap();
        let result = fixture.service.deploy_create2_safe_tx(intent.safe).await;
        assert!(matches!(
            result,
            Err(SafeRelayError::NotEnoughFundingForCreation { .. })
        ));
        assert!(result.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn test_deploy_sends_once() {
        let mut provider = estimating_provider();
        provider
            .expect_get_balance()
            .returning(|_, _| Box::pin(async { Ok(U256::MAX) }));
        provider
            .expect_get_transaction_count()
            .returning(|_| Box::pin(async { Ok(3) }));
        provider
            .expect_send_raw_transaction()
            .times(1)
            .returning(|raw| {
                let hash = keccak256(raw);
                Box::pin(async move { Ok(hash) })
            });

        let fixture = creation_service(provider);
        let intent = fixture.service.create2_safe_tx(request()).await.unwrap();

        let deployed = fixture.service.deploy_create2_safe_tx(intent.safe).await.unwrap();
        let tx_hash = deployed.tx_hash.unwrap();
        assert_ne!(tx_hash, B256::ZERO);
        assert_eq!(deployed.tx_nonce, Some(3));
        assert_eq!(deployed.tx_gas_price, Some(intent.gas_price_estimated));

        // Second deploy is a no-op
        let again = fixture.service.deploy_create2_safe_tx(intent.safe).await.unwrap();
        assert_eq!(again.tx_hash, Some(tx_hash));
    }

    #[tokio::test]
    async fn test_deploy_unknown_safe() {
        let fixture = creation_service(MockEvmProviderTrait::new());
        assert!(matches!(
            fixture
                .service
                .deploy_create2_safe_tx(Address::repeat_byte(1))
                .await,
            Err(SafeRelayError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_estimate_for_all_tokens() {
        let fixture = creation_service(estimating_provider());
        let token = create_test_token(Address::repeat_byte(0x77), true);
        let mut unpriced = create_test_token(Address::repeat_byte(0x78), true);
        unpriced.fixed_eth_conversion = None;
        fixture.tokens.upsert(token.clone()).await.unwrap();
        fixture.tokens.upsert(unpriced).await.unwrap();

        let estimates = fixture
            .service
            .estimate_safe_creation_for_all_tokens(3)
            .await
            .unwrap();
        assert_eq!(estimates.len(), 2);
        let ether = &estimates[0];
        assert_eq!(ether.payment_token, Address::ZERO);
        assert_eq!(estimates[1].gas, ether.gas + 50_000);
        assert_eq!(estimates[1].payment, ether.payment * U256::from(2u64));
        assert_eq!(estimates[1].payment_token, token.address);
    }

    #[tokio::test]
    async fn test_create_safe_tx_legacy() {
        let fixture = creation_service(MockEvmProviderTrait::new());
        let creation = fixture
            .service
            .create_safe_tx(LegacyCreationRequest {
                s: U256::from(0xdead_beefu64) << 64,
                owners: owners(),
                threshold: 1,
                payment_token: None,
            })
            .await
            .unwrap();
        assert_eq!(creation.safe, creation.deployer.create(0));
        assert_eq!(creation.gas_price, 20 * GWEI);
        assert_eq!(creation.master_copy, test_contracts().legacy_master_copy.unwrap());

        let funding = fixture.legacy.get_funding(creation.safe).await.unwrap();
        assert!(!funding.safe_funded);
    }

    #[tokio::test]
    async fn test_deploy_funded_safes_skips_unfunded() {
        let mut provider = estimating_provider();
        provider
            .expect_get_balance()
            .returning(|_, _| Box::pin(async { Ok(U256::ZERO) }));
        let fixture = creation_service(provider);
        fixture.service.create2_safe_tx(request()).await.unwrap();
        assert_eq!(fixture.service.deploy_funded_safes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_deploys_send_once() {
        let mut provider = estimating_provider();
        provider.expect_get_balance().returning(|_, _| {
            Box::pin(async {
                tokio::task::yield_now().await;
                Ok(U256::MAX)
            })
        });
        provider
            .expect_get_transaction_count()
            .returning(|_| Box::pin(async { Ok(0) }));
        provider
            .expect_send_raw_transaction()
            .times(1)
            .returning(|raw| {
                let hash = keccak256(raw);
                Box::pin(async move { Ok(hash) })
            });

        let fixture = creation_service(provider);
        let intent = fixture.service.create2_safe_tx(request()).await.unwrap();

        let (a, b) = tokio::join!(
            fixture.service.deploy_create2_safe_tx(intent.safe),
            fixture.service.deploy_create2_safe_tx(intent.safe)
        );
        let (deployed, busy) = if a.is_ok() { (a, b) } else { (b, a) };
        let tx_hash = deployed.unwrap().tx_hash.unwrap();
        let busy = busy.unwrap_err();
        assert!(matches!(busy, SafeRelayError::StepInProgress { safe, .. } if safe == intent.safe));
        assert!(busy.is_transient());

        // The retried deploy sees the stored hash
        let again = fixture.service.deploy_create2_safe_tx(intent.safe).await.unwrap();
        assert_eq!(again.tx_hash, Some(tx_hash));
    }
}
