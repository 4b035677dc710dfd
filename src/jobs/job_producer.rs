//! Producer side of the on-demand job channel.
//!
//! Jobs are delivered over a bounded tokio channel to the [`JobWorker`](super::JobWorker).
//! A delayed job is held by a spawned timer task, so a process restart drops
//! it; the periodic passes of the scheduler pick the Safe up again.
use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error};

#[cfg(test)]
use mockall::automock;

use crate::jobs::{Job, SafeJob};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobProducerError {
    #[error("Queue error: {0}")]
    QueueError(String),
}

pub type JobReceiver = mpsc::Receiver<Job<SafeJob>>;

#[async_trait]
#[cfg_attr(test, automock)]
pub trait JobProducerTrait: Send + Sync {
    async fn produce_fund_deployer_job(
        &self,
        safe: Address,
        delay: Option<Duration>,
    ) -> Result<(), JobProducerError>;

    async fn produce_check_deployer_funded_job(
        &self,
        safe: Address,
        delay: Option<Duration>,
    ) -> Result<(), JobProducerError>;

    async fn produce_deploy_create2_safe_job(
        &self,
        safe: Address,
        delay: Option<Duration>,
    ) -> Result<(), JobProducerError>;

    /// Puts a job back on the channel, typically after a failed attempt.
    async fn requeue_job(
        &self,
        job: Job<SafeJob>,
        delay: Option<Duration>,
    ) -> Result<(), JobProducerError>;
}

#[derive(Debug, Clone)]
pub struct JobProducer {
    sender: mpsc::Sender<Job<SafeJob>>,
}

impl JobProducer {
    pub fn new(capacity: usize) -> (Self, JobReceiver) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }

    async fn push(&self, job: Job<SafeJob>, delay: Option<Duration>) -> Result<(), JobProducerError> {
        let job_type = job.data.to_string();
        let safe = job.data.safe();

        match delay.filter(|d| !d.is_zero()) {
            None => {
                self.sender
                    .send(job)
                    .await
                    .map_err(|e| JobProducerError::QueueError(e.to_string()))?;
                debug!(job_type = %job_type, safe = %safe, "job produced");
            }
            Some(delay) => {
                if self.sender.is_closed() {
                    return Err(JobProducerError::QueueError("channel closed".into()));
                }
                debug!(
                    job_type = %job_type,
                    safe = %safe,
                    delay_secs = delay.as_secs(),
                    "delayed job scheduled"
                );
                let sender = self.sender.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = sender.send(job).await {
                        error!(job_type = %job_type, safe = %safe, error = %e, "failed to produce delayed job");
                    }
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl JobProducerTrait for JobProducer {
    async fn produce_fund_deployer_job(
        &self,
        safe: Address,
        delay: Option<Duration>,
    ) -> Result<(), JobProducerError> {
        self.push(Job::new(SafeJob::FundDeployer { safe }), delay).await
    }

    async fn produce_check_deployer_funded_job(
        &self,
        safe: Address,
        delay: Option<Duration>,
    ) -> Result<(), JobProducerError> {
        self.push(Job::new(SafeJob::CheckDeployerFunded { safe }), delay)
            .await
    }

    async fn produce_deploy_create2_safe_job(
        &self,
        safe: Address,
        delay: Option<Duration>,
    ) -> Result<(), JobProducerError> {
        self.push(Job::new(SafeJob::DeployCreate2Safe { safe }), delay)
            .await
    }

    async fn requeue_job(
        &self,
        job: Job<SafeJob>,
        delay: Option<Duration>,
    ) -> Result<(), JobProducerError> {
        self.push(job, delay).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_produce_delivers_job() {
        let (producer, mut receiver) = JobProducer::new(4);
        let safe = Address::repeat_byte(0x33);
        producer
            .produce_deploy_create2_safe_job(safe, None)
            .await
            .unwrap();

        let job = receiver.recv().await.unwrap();
        assert_eq!(job.data, SafeJob::DeployCreate2Safe { safe });
        assert_eq!(job.attempt, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_job_arrives_after_delay() {
        let (producer, mut receiver) = JobProducer::new(4);
        let safe = Address::repeat_byte(0x44);
        producer
            .produce_check_deployer_funded_job(safe, Some(Duration::from_secs(20)))
            .await
            .unwrap();

        assert!(receiver.try_recv().is_err());
        tokio::time::advance(Duration::from_secs(21)).await;
        let job = receiver.recv().await.unwrap();
        assert_eq!(job.data, SafeJob::CheckDeployerFunded { safe });
    }

    #[tokio::test]
    async fn test_closed_channel_is_an_error() {
        let (producer, receiver) = JobProducer::new(1);
        drop(receiver);
        let result = producer
            .produce_fund_deployer_job(Address::ZERO, None)
            .await;
        assert!(matches!(result, Err(JobProducerError::QueueError(_))));
    }
}
