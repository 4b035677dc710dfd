use std::time::Duration;

use tracing::{debug, error, warn};

use crate::jobs::{BackoffRetryPolicy, Job, JobError, SafeJob};

mod safe_job_handler;
pub use safe_job_handler::*;

/// What the worker does with a job after running it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// Requeue after the delay.
    Retry(Duration),
    /// Dropped. The periodic passes may still pick the Safe up.
    Failed,
}

/// Decides the fate of a job from its result.
///
/// # Retry Strategy
/// - On success: job completes
/// - On a transient error: retried with backoff until the policy gives up
/// - On any other error, or with `allow_retry` unset: job fails
pub fn handle_result(
    result: Result<(), JobError>,
    job: &Job<SafeJob>,
    policy: &BackoffRetryPolicy,
) -> JobOutcome {
    let job_type = job.data.to_string();
    let safe = job.data.safe();

    let err = match result {
        Ok(()) => {
            debug!(job_type = %job_type, safe = %safe, "job handled successfully");
            return JobOutcome::Completed;
        }
        Err(err) => err,
    };

    warn!(
        job_type = %job_type,
        safe = %safe,
        error = %err,
        attempt = job.attempt,
        max_attempts = policy.retries,
        "job failed"
    );

    if !job.allow_retry || !err.is_transient() {
        error!(job_type = %job_type, safe = %safe, "job failed permanently");
        return JobOutcome::Failed;
    }

    match policy.retry_after(job.attempt) {
        Some(delay) => JobOutcome::Retry(delay),
        None => {
            error!(
                job_type = %job_type,
                safe = %safe,
                max_attempts = policy.retries,
                "max attempts reached, failing job"
            );
            JobOutcome::Failed
        }
    }
}
