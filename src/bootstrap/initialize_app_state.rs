//! Application state initialization
//!
//! Builds every repository and service once and wires them together. Nothing
//! below holds a global: tests build their own state around a fake chain.
use std::sync::Arc;

use color_eyre::Result;
use eyre::eyre;
use redis::aio::ConnectionManager;
use tracing::{info, warn};

use crate::{
    config::{RepositoryStorageType, ServerConfig},
    constants::JOB_CHANNEL_CAPACITY,
    domain::{
        safe::{contracts::IProxyFactory, SafeReader},
        Create2Reconciler, LegacyReconciler, ReconcilerSettings, RelayService,
        SafeCreationService,
    },
    jobs::{JobProducer, JobReceiver},
    models::{AppState, DefaultAppState, RepositoryError, SafeContracts, SafeVersion},
    repositories::{
        LegacyFundingRepositoryStorage, MultisigTxRepositoryStorage,
        NonceCounterRepositoryStorage, SafeDeploymentRepositoryStorage, TokenRepositoryStorage,
    },
    services::{
        EvmProvider, EvmProviderTrait, FixedGasStation, FundingService, GasStationService,
        LocalSigner, NetworkGasStation, NonceLockService, RetryConfig, TransactionSender,
    },
    utils::{initialize_redis_connection, LockManager},
};

/// Every store the relay persists to, from one backend.
#[derive(Debug, Clone)]
pub struct Repositories {
    pub deployments: Arc<SafeDeploymentRepositoryStorage>,
    pub legacy: Arc<LegacyFundingRepositoryStorage>,
    pub multisig_txs: Arc<MultisigTxRepositoryStorage>,
    pub tokens: Arc<TokenRepositoryStorage>,
    pub nonce_counter: Arc<NonceCounterRepositoryStorage>,
    pub lock_manager: LockManager,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            deployments: Arc::new(SafeDeploymentRepositoryStorage::new_in_memory()),
            legacy: Arc::new(LegacyFundingRepositoryStorage::new_in_memory()),
            multisig_txs: Arc::new(MultisigTxRepositoryStorage::new_in_memory()),
            tokens: Arc::new(TokenRepositoryStorage::new_in_memory()),
            nonce_counter: Arc::new(NonceCounterRepositoryStorage::new_in_memory()),
            lock_manager: LockManager::new_in_memory(),
        }
    }

    pub fn redis(
        connection_manager: Arc<ConnectionManager>,
        key_prefix: &str,
    ) -> Result<Self, RepositoryError> {
        let prefix = key_prefix.to_string();
        Ok(Self {
            deployments: Arc::new(SafeDeploymentRepositoryStorage::new_redis(
                connection_manager.clone(),
                prefix.clone(),
            )?),
            legacy: Arc::new(LegacyFundingRepositoryStorage::new_redis(
                connection_manager.clone(),
                prefix.clone(),
            )?),
            multisig_txs: Arc::new(MultisigTxRepositoryStorage::new_redis(
                connection_manager.clone(),
                prefix.clone(),
            )?),
            tokens: Arc::new(TokenRepositoryStorage::new_redis(
                connection_manager.clone(),
                prefix.clone(),
            )?),
            nonce_counter: Arc::new(NonceCounterRepositoryStorage::new_redis(
                connection_manager.clone(),
                prefix.clone(),
            )?),
            lock_manager: LockManager::new_redis(connection_manager, format!("{prefix}:locks")),
        })
    }
}

pub async fn initialize_repositories(config: &ServerConfig) -> Result<Repositories> {
    match config.repository_storage_type {
        RepositoryStorageType::InMemory => {
            info!("using in-memory repositories");
            Ok(Repositories::in_memory())
        }
        RepositoryStorageType::Redis => {
            let connection_manager = initialize_redis_connection(config).await?;
            info!(key_prefix = %config.redis_key_prefix, "using redis repositories");
            Ok(Repositories::redis(connection_manager, &config.redis_key_prefix)?)
        }
    }
}

/// Contract addresses from the config plus the proxy code served by the
/// factory. The runtime code is optional: without it relayed Safes are not
/// checked against the factory's proxy.
pub async fn load_safe_contracts<P: EvmProviderTrait>(
    config: &ServerConfig,
    provider: Arc<P>,
) -> Result<SafeContracts> {
    let default_version: SafeVersion = config.safe_version.parse().map_err(|e: String| eyre!(e))?;
    let reader = SafeReader::new(provider, default_version);
    let factory = config.safe_proxy_factory_address;

    let proxy_creation_code = match &config.safe_proxy_creation_code {
        Some(code) => code.clone(),
        None => reader
            .call(factory, IProxyFactory::proxyCreationCodeCall {})
            .await
            .map_err(|e| eyre!("Cannot read proxy creation code from {factory}: {e}"))?,
    };
    let proxy_runtime_code = match reader
        .call(factory, IProxyFactory::proxyRuntimeCodeCall {})
        .await
    {
        Ok(code) => Some(code),
        Err(e) => {
            warn!(proxy_factory = %factory, error = %e, "cannot read proxy runtime code");
            None
        }
    };

    Ok(SafeContracts {
        master_copy: config.safe_contract_address,
        legacy_master_copy: config.safe_old_contract_address,
        valid_master_copies: config.valid_master_copies(),
        proxy_factory: factory,
        fallback_handler: config.safe_default_callback_handler,
        proxy_creation_code,
        proxy_runtime_code,
        paying_proxy_code: config.safe_paying_proxy_code.clone(),
        default_version,
    })
}

/// Wires the services around an existing chain client and stores.
///
/// The funder key pays deployments and legacy deployer transfers, the tx
/// sender key pays relayed multisig txs. Both draw nonces from one lock
/// service.
pub async fn build_app_state<P: EvmProviderTrait + 'static>(
    provider: Arc<P>,
    config: &ServerConfig,
    repositories: Repositories,
    contracts: SafeContracts,
) -> Result<(Arc<AppState<P>>, JobReceiver)> {
    let chain_id = provider.get_chain_id().await?;
    let contracts = Arc::new(contracts);

    let gas_station = Arc::new(match config.fixed_gas_price {
        Some(gwei) => GasStationService::Fixed(FixedGasStation::new(Some(gwei))),
        None => GasStationService::Network(NetworkGasStation::new(
            provider.clone(),
            config.gas_station_number_blocks,
        )),
    });

    let nonce_lock = Arc::new(NonceLockService::new(
        provider.clone(),
        repositories.nonce_counter.clone(),
        repositories.lock_manager.clone(),
    ));
    let funder = Arc::new(TransactionSender::new(
        provider.clone(),
        LocalSigner::new(&config.safe_funder_private_key)?,
        chain_id,
        nonce_lock.clone(),
    ));
    let tx_sender = Arc::new(TransactionSender::new(
        provider.clone(),
        LocalSigner::new(&config.safe_tx_sender_private_key)?,
        chain_id,
        nonce_lock,
    ));
    info!(
        chain_id,
        funder = %funder.address(),
        tx_sender = %tx_sender.address(),
        "relay accounts loaded"
    );

    let (job_producer, receiver) = JobProducer::new(JOB_CHANNEL_CAPACITY);
    let job_producer = Arc::new(job_producer);
    let settings = ReconcilerSettings::from(config);

    let creation = Arc::new(SafeCreationService::new(
        provider.clone(),
        contracts.clone(),
        repositories.deployments.clone(),
        repositories.legacy.clone(),
        repositories.tokens.clone(),
        gas_station.clone(),
        funder.clone(),
        repositories.lock_manager.clone(),
        config.safe_fixed_creation_cost,
    ));
    let relay = Arc::new(RelayService::new(
        provider.clone(),
        contracts.clone(),
        repositories.multisig_txs.clone(),
        repositories.tokens.clone(),
        gas_station.clone(),
        tx_sender,
        repositories.lock_manager.clone(),
        chain_id,
    ));
    let legacy_reconciler = Arc::new(LegacyReconciler::new(
        provider.clone(),
        repositories.legacy.clone(),
        Arc::new(FundingService::new(
            funder.clone(),
            gas_station.clone(),
            config.safe_funder_max_eth,
        )),
        job_producer.clone(),
        repositories.lock_manager.clone(),
        settings.clone(),
    ));
    let create2_reconciler = Arc::new(Create2Reconciler::new(
        provider.clone(),
        repositories.deployments.clone(),
        funder,
        settings,
    ));

    let app_state = Arc::new(AppState {
        provider,
        contracts,
        deployments: repositories.deployments,
        legacy: repositories.legacy,
        multisig_txs: repositories.multisig_txs,
        tokens: repositories.tokens,
        gas_station,
        creation,
        relay,
        legacy_reconciler,
        create2_reconciler,
        job_producer,
        lock_manager: repositories.lock_manager,
    });

    Ok((app_state, receiver))
}

/// Initializes application state against the configured node and stores.
///
/// # Errors
///
/// Returns error if:
/// - The node URL or a private key is invalid
/// - Redis is selected but unreachable
/// - The proxy creation code is neither configured nor served by the factory
pub async fn initialize_app_state(
    config: &ServerConfig,
) -> Result<(Arc<DefaultAppState>, JobReceiver)> {
    let provider = Arc::new(EvmProvider::new(
        &config.ethereum_node_url,
        config.rpc_timeout_ms,
        RetryConfig::from_config(config),
    )?);
    let repositories = initialize_repositories(config).await?;
    let contracts = load_safe_contracts(config, provider.clone()).await?;
    build_app_state(provider, config, repositories, contracts).await
}
