//! # Jobs Module
//!
//! Background execution: on-demand jobs for a single Safe travel through an
//! in-process channel to the [`JobWorker`], periodic reconciler passes are
//! driven by the cron [`Scheduler`].
use thiserror::Error;

use crate::models::SafeRelayError;

mod job;
pub use job::*;

mod job_producer;
pub use job_producer::*;

mod retry_backoff;
pub use retry_backoff::*;

mod handlers;
pub use handlers::*;

mod worker;
pub use worker::*;

mod scheduler;
pub use scheduler::*;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Relay error: {0}")]
    Relay(#[from] SafeRelayError),

    #[error("Job producer error: {0}")]
    Producer(#[from] JobProducerError),

    #[error("Invalid cron expression '{expression}' for {task}: {reason}")]
    InvalidSchedule {
        task: String,
        expression: String,
        reason: String,
    },
}

impl JobError {
    /// A closed job channel or a bad schedule never heal by retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            JobError::Relay(e) => e.is_transient(),
            JobError::Producer(_) | JobError::InvalidSchedule { .. } => false,
        }
    }
}
