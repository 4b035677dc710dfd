//! Consumer side of the on-demand job channel.
use std::sync::Arc;

use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info};

use crate::jobs::{
    handle_result, retry_policy, safe_job_handler, Job, JobOutcome, JobProducerTrait, JobReceiver,
    SafeJob,
};
use crate::models::AppState;
use crate::services::EvmProviderTrait;

/// Pulls jobs off the channel and runs each one on its own task.
pub struct JobWorker<P: EvmProviderTrait + 'static> {
    app_state: Arc<AppState<P>>,
    receiver: JobReceiver,
    shutdown_rx: watch::Receiver<bool>,
}

impl<P: EvmProviderTrait + 'static> JobWorker<P> {
    pub fn new(
        app_state: Arc<AppState<P>>,
        receiver: JobReceiver,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            app_state,
            receiver,
            shutdown_rx,
        }
    }

    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        info!("job worker started");
        loop {
            tokio::select! {
                job = self.receiver.recv() => {
                    let Some(job) = job else {
                        info!("job channel closed");
                        break;
                    };
                    tokio::spawn(process_job(self.app_state.clone(), job));
                }
                _ = self.shutdown_rx.changed() => {
                    info!("shutdown signal received, stopping job worker");
                    break;
                }
            }
        }
        info!("job worker stopped");
    }
}

/// Runs one job and requeues it when the retry policy says so.
pub async fn process_job<P: EvmProviderTrait>(
    app_state: Arc<AppState<P>>,
    job: Job<SafeJob>,
) -> JobOutcome {
    let policy = retry_policy(&job.data);
    let result = safe_job_handler(&job, &app_state).await;
    let outcome = handle_result(result, &job, &policy);

    if let JobOutcome::Retry(delay) = outcome {
        let job_type = job.data.to_string();
        let safe = job.data.safe();
        if let Err(e) = app_state
            .job_producer
            .requeue_job(job.next_attempt(), Some(delay))
            .await
        {
            error!(job_type = %job_type, safe = %safe, error = %e, "failed to requeue job");
        }
    }
    outcome
}
