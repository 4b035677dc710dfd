use std::sync::Arc;

use alloy::primitives::Address;

use crate::domain::{Create2Reconciler, LegacyReconciler, RelayService, SafeCreationService};
use crate::jobs::{JobProducer, JobProducerError, JobProducerTrait};
use crate::models::SafeContracts;
use crate::repositories::{
    LegacyFundingRepositoryStorage, MultisigTxRepositoryStorage, SafeDeploymentRepositoryStorage,
    TokenRepositoryStorage,
};
use crate::services::{EvmProvider, EvmProviderTrait, GasStationService};
use crate::utils::LockManager;

/// Services built once at startup and shared by the scheduler, the job
/// worker and any request front end.
pub struct AppState<P: EvmProviderTrait = EvmProvider> {
    pub provider: Arc<P>,
    pub contracts: Arc<SafeContracts>,
    pub deployments: Arc<SafeDeploymentRepositoryStorage>,
    pub legacy: Arc<LegacyFundingRepositoryStorage>,
    pub multisig_txs: Arc<MultisigTxRepositoryStorage>,
    pub tokens: Arc<TokenRepositoryStorage>,
    pub gas_station: Arc<GasStationService<P>>,
    pub creation: Arc<SafeCreationService<P>>,
    pub relay: Arc<RelayService<P>>,
    pub legacy_reconciler: Arc<LegacyReconciler<P, JobProducer>>,
    pub create2_reconciler: Arc<Create2Reconciler<P>>,
    pub job_producer: Arc<JobProducer>,
    /// Task level locks of the scheduler.
    pub lock_manager: LockManager,
}

pub type DefaultAppState = AppState<EvmProvider>;

impl<P: EvmProviderTrait> AppState<P> {
    /// Signals that a predicted Safe may hold its payment now.
    pub async fn request_create2_deployment(&self, safe: Address) -> Result<(), JobProducerError> {
        self.job_producer
            .produce_deploy_create2_safe_job(safe, None)
            .await
    }

    /// Signals that a legacy Safe may have received its payment.
    pub async fn request_legacy_funding_check(&self, safe: Address) -> Result<(), JobProducerError> {
        self.job_producer.produce_fund_deployer_job(safe, None).await
    }
}
