//! Relay services wired around a [`FakeChain`] and in-memory stores.

use std::str::FromStr;
use std::sync::Arc;

use alloy::{
    primitives::{address, bytes, Address, Bytes, U256},
    signers::local::PrivateKeySigner,
};

use safe_relay_service::{
    bootstrap::{build_app_state, load_safe_contracts, Repositories},
    config::{RepositoryStorageType, SecretKey, ServerConfig},
    jobs::JobReceiver,
    models::{AppState, SafeCreation2Request},
};

use super::fake_chain::{FakeChain, SAFE_VERSION};
use super::logging::init_test_logging;

pub const PROXY_FACTORY: Address = address!("0x12302fE9c02ff50939BaAaaf415fc226C078613C");
pub const MASTER_COPY: Address = address!("0xb6029EA3B2c51D09a50B53CA8012FeEB05bDa35A");
pub const FALLBACK_HANDLER: Address = address!("0xd5D82B6aDDc9027B22dCA772Aa68D5d74cdBdF44");

/// Well known development keys, never funded outside of tests.
pub const FUNDER_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
pub const TX_SENDER_KEY: &str =
    "0x5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9ad8cfee10a8a";

/// Base of the fixed gas station: standard is 12 gwei, fast 13 gwei.
pub const FIXED_GAS_PRICE_GWEI: u128 = 10;

pub fn ether(amount: u64) -> U256 {
    U256::from(amount) * U256::from(10u64).pow(U256::from(18u64))
}

pub fn proxy_creation_code() -> Bytes {
    bytes!("608060405234801561001057600080fd5b5060405161016b38038061016b8339810180604052602081101561003357600080fd5b5051")
}

pub fn proxy_runtime_code() -> Bytes {
    bytes!("608060405273ffffffffffffffffffffffffffffffffffffffff600054163660008037600080366000845af43d6000803e")
}

pub fn key_address(key: &str) -> Address {
    PrivateKeySigner::from_str(key).unwrap().address()
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        redis_url: "redis://127.0.0.1:6379".to_string(),
        redis_key_prefix: "safe_relay_test".to_string(),
        redis_connection_timeout_ms: 1_000,
        repository_storage_type: RepositoryStorageType::InMemory,
        ethereum_node_url: "http://localhost:8545".to_string(),
        rpc_timeout_ms: 1_000,
        provider_max_retries: 0,
        provider_retry_base_delay_ms: 10,
        provider_retry_max_delay_ms: 10,
        safe_contract_address: MASTER_COPY,
        safe_old_contract_address: None,
        safe_valid_contract_addresses: vec![],
        safe_proxy_factory_address: PROXY_FACTORY,
        safe_default_callback_handler: FALLBACK_HANDLER,
        // Read from the factory
        safe_proxy_creation_code: None,
        safe_paying_proxy_code: None,
        safe_funder_private_key: SecretKey::new(FUNDER_KEY),
        safe_tx_sender_private_key: SecretKey::new(TX_SENDER_KEY),
        safe_funder_max_eth: ether(1),
        safe_fixed_creation_cost: None,
        safe_funding_confirmations: 0,
        safe_check_deployer_funded_retries: 3,
        safe_check_deployer_funded_delay: 1,
        safe_deploy_timeout_minutes: 10,
        safe_create2_replace_timeout_minutes: 10,
        safe_gas_bump_factor: 1.2,
        safe_version: SAFE_VERSION.to_string(),
        fixed_gas_price: Some(FIXED_GAS_PRICE_GWEI),
        gas_station_number_blocks: 10,
    }
}

pub struct TestContext {
    pub chain: Arc<FakeChain>,
    pub state: Arc<AppState<FakeChain>>,
    pub receiver: JobReceiver,
    pub funder: Address,
    pub tx_sender: Address,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    /// Builds the services the way the binary does, with both relay
    /// accounts holding 100 ether.
    pub async fn with_config(config: ServerConfig) -> Self {
        init_test_logging();
        let chain = Arc::new(FakeChain::new(
            PROXY_FACTORY,
            proxy_creation_code(),
            proxy_runtime_code(),
        ));
        let funder = key_address(FUNDER_KEY);
        let tx_sender = key_address(TX_SENDER_KEY);
        chain.set_balance(funder, ether(100));
        chain.set_balance(tx_sender, ether(100));

        let contracts = load_safe_contracts(&config, chain.clone()).await.unwrap();
        let (state, receiver) =
            build_app_state(chain.clone(), &config, Repositories::in_memory(), contracts)
                .await
                .unwrap();

        Self {
            chain,
            state,
            receiver,
            funder,
            tx_sender,
        }
    }

    pub fn creation_request(owners: Vec<Address>, threshold: u64, salt_nonce: u64) -> SafeCreation2Request {
        SafeCreation2Request {
            salt_nonce: U256::from(salt_nonce),
            owners,
            threshold,
            payment_token: None,
            setup_data: None,
            to: None,
        }
    }

    /// Predicts, funds and deploys a CREATE2 Safe paying in ether.
    pub async fn deploy_safe(&self, owners: Vec<Address>, threshold: u64, salt_nonce: u64) -> Address {
        let intent = self
            .state
            .creation
            .create2_safe_tx(Self::creation_request(owners, threshold, salt_nonce))
            .await
            .unwrap();
        self.chain.set_balance(intent.safe, intent.payment);
        self.state
            .creation
            .deploy_create2_safe_tx(intent.safe)
            .await
            .unwrap();
        intent.safe
    }
}
