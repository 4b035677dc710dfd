use std::time::Duration;

#[derive(Clone, Debug)]
pub struct BackoffRetryPolicy {
    pub retries: usize,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for BackoffRetryPolicy {
    fn default() -> Self {
        Self {
            retries: 25,
            initial_backoff: Duration::from_millis(1000),
            multiplier: 1.5,
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl BackoffRetryPolicy {
    pub fn with_retries(retries: usize) -> Self {
        Self {
            retries,
            ..Default::default()
        }
    }

    pub fn backoff_duration(&self, attempt: usize) -> Duration {
        let backoff =
            self.initial_backoff.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        Duration::from_millis(backoff.min(self.max_backoff.as_millis() as f64) as u64)
    }

    /// Delay before the next run of a job that failed on `attempt`, `None`
    /// once the retry budget is spent.
    pub fn retry_after(&self, attempt: usize) -> Option<Duration> {
        (attempt < self.retries).then(|| self.backoff_duration(attempt))
    }
}
