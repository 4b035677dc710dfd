//! Runs a [`SafeJob`] against the shared services.
use tracing::{debug, info};

use crate::constants::{
    WORKER_CREATE2_DEPLOY_RETRIES, WORKER_DEFAULT_MAXIMUM_RETRIES, WORKER_FUND_DEPLOYER_RETRIES,
};
use crate::jobs::{BackoffRetryPolicy, Job, JobError, SafeJob};
use crate::models::AppState;
use crate::services::EvmProviderTrait;

/// Retry budget of each job type.
///
/// A CREATE2 deploy is retried while the Safe is not funded yet.
pub fn retry_policy(job: &SafeJob) -> BackoffRetryPolicy {
    match job {
        SafeJob::FundDeployer { .. } => BackoffRetryPolicy::with_retries(WORKER_FUND_DEPLOYER_RETRIES),
        SafeJob::CheckDeployerFunded { .. } => {
            BackoffRetryPolicy::with_retries(WORKER_DEFAULT_MAXIMUM_RETRIES)
        }
        SafeJob::DeployCreate2Safe { .. } => {
            BackoffRetryPolicy::with_retries(WORKER_CREATE2_DEPLOY_RETRIES)
        }
    }
}

pub async fn safe_job_handler<P: EvmProviderTrait>(
    job: &Job<SafeJob>,
    state: &AppState<P>,
) -> Result<(), JobError> {
    debug!(job_type = %job.data, message_id = %job.message_id, attempt = job.attempt, "handling job");

    match job.data {
        SafeJob::FundDeployer { safe } => {
            let funding = state.legacy_reconciler.fund_deployer(safe).await?;
            debug!(safe = %safe, state = %funding, "legacy funding advanced");
        }
        SafeJob::CheckDeployerFunded { safe } => {
            let funding = state.legacy_reconciler.check_deployer_funded(safe).await?;
            debug!(safe = %safe, state = %funding, "deployer funding checked");
        }
        SafeJob::DeployCreate2Safe { safe } => {
            let intent = state.creation.deploy_create2_safe_tx(safe).await?;
            if let Some(tx_hash) = intent.tx_hash {
                info!(safe = %safe, tx_hash = %tx_hash, "create2 safe deployment handled");
            }
        }
    }
    Ok(())
}
