use alloy::primitives::Address;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

// Common message structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job<T> {
    pub message_id: String,
    pub version: String,
    pub timestamp: String,
    pub source: Option<String>,
    /// Zero based count of earlier failed runs of this job.
    pub attempt: usize,
    /// Administrative and test callers disable automatic retries.
    pub allow_retry: bool,
    pub data: T,
}

impl<T> Job<T> {
    pub fn new(data: T) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            version: "1.0".to_string(),
            timestamp: Utc::now().timestamp().to_string(),
            source: None,
            attempt: 0,
            allow_retry: true,
            data,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn without_retry(mut self) -> Self {
        self.allow_retry = false;
        self
    }

    /// The same job, one attempt further.
    pub fn next_attempt(mut self) -> Self {
        self.attempt += 1;
        self
    }
}

/// On-demand work for a single Safe. Periodic passes are driven by the
/// scheduler and never travel through the job channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SafeJob {
    /// Advance a legacy Safe through safe and deployer funding.
    FundDeployer { safe: Address },
    /// Poll the receipt of a legacy deployer funding transfer.
    CheckDeployerFunded { safe: Address },
    /// Deploy a CREATE2 Safe once it holds its payment.
    DeployCreate2Safe { safe: Address },
}

impl SafeJob {
    pub fn safe(&self) -> Address {
        match self {
            SafeJob::FundDeployer { safe }
            | SafeJob::CheckDeployerFunded { safe }
            | SafeJob::DeployCreate2Safe { safe } => *safe,
        }
    }
}
