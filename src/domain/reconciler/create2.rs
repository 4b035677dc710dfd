//! Confirmation and replace-by-fee of CREATE2 Safe deployments.
use std::sync::Arc;

use alloy::primitives::B256;
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use super::{has_confirmations, ReconcilerSettings};
use crate::domain::creation::deployment_tx_params;
use crate::models::{ReceiptSummary, SafeDeploymentIntent, SafeRelayError, TxSubmission};
use crate::repositories::{SafeDeploymentRepositoryStorage, SafeDeploymentRepositoryTrait};
use crate::services::{EvmProviderTrait, ProviderError, TransactionSender};
use crate::utils::{is_older_than, now_rfc3339};

/// Outcome of one confirmation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentStatus {
    /// Nothing sent yet.
    NotSubmitted,
    Pending,
    Confirmed(u64),
    /// Mined but reverted. Needs an operator.
    Reverted,
    Replaced(B256),
}

/// Gas price of a replacement: at least one wei above `gas_price` so the
/// node accepts it.
pub fn bumped_gas_price(gas_price: u128, factor: f64) -> u128 {
    // Per mille keeps the product exact for the usual factors
    let permille = (factor * 1000.0).round().max(0.0) as u128;
    let bumped = gas_price.saturating_mul(permille).div_ceil(1000);
    bumped.max(gas_price + 1)
}

pub struct Create2Reconciler<P: EvmProviderTrait> {
    provider: Arc<P>,
    deployments: Arc<SafeDeploymentRepositoryStorage>,
    funder: Arc<TransactionSender<P>>,
    settings: ReconcilerSettings,
}

impl<P: EvmProviderTrait> Create2Reconciler<P> {
    pub fn new(
        provider: Arc<P>,
        deployments: Arc<SafeDeploymentRepositoryStorage>,
        funder: Arc<TransactionSender<P>>,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            provider,
            deployments,
            funder,
            settings,
        }
    }

    /// Stamps the confirmed block of a buried deployment, or replaces a
    /// deployment that stayed unmined past the timeout.
    ///
    /// Every tx sent for the Safe is checked, since the one mined may be an
    /// earlier tx and not its replacement. Safe code without any receipt
    /// confirms the deployment too.
    pub async fn check_deployment(
        &self,
        intent: &SafeDeploymentIntent,
    ) -> Result<DeploymentStatus, SafeRelayError> {
        let safe = intent.safe;
        if let Some(block) = intent.confirmed_block {
            return Ok(DeploymentStatus::Confirmed(block));
        }
        let Some(tx_hash) = intent.tx_hash else {
            return Ok(DeploymentStatus::NotSubmitted);
        };

        if let Some((receipt, block_number)) = self.find_mined_receipt(intent).await? {
            let mined_hash = receipt.transaction_hash;
            if !receipt.status {
                error!(safe = %safe, tx_hash = %mined_hash, block_number, "safe deployment reverted");
                return Ok(DeploymentStatus::Reverted);
            }
            let current_block = self.provider.get_block_number().await?;
            if !has_confirmations(&receipt, current_block, self.settings.confirmations) {
                debug!(safe = %safe, tx_hash = %mined_hash, block_number, "safe deployment waiting for confirmations");
                return Ok(DeploymentStatus::Pending);
            }
            self.deployments
                .set_confirmed_block(safe, block_number)
                .await?;
            info!(safe = %safe, tx_hash = %mined_hash, block_number, "safe deployment confirmed");
            return Ok(DeploymentStatus::Confirmed(block_number));
        }

        if !self.provider.get_code(safe).await?.is_empty() {
            return self.confirm_from_code(intent).await;
        }

        let submitted_at = intent
            .tx_submitted_at
            .as_deref()
            .unwrap_or(intent.created_at.as_str());
        if !is_older_than(submitted_at, self.settings.create2_replace_timeout) {
            debug!(safe = %safe, tx_hash = %tx_hash, "safe deployment pending");
            return Ok(DeploymentStatus::Pending);
        }
        self.replace_deployment(intent, tx_hash).await
    }

    /// First mined receipt among the deployment txs, the latest tx first.
    async fn find_mined_receipt(
        &self,
        intent: &SafeDeploymentIntent,
    ) -> Result<Option<(ReceiptSummary, u64)>, SafeRelayError> {
        for tx_hash in intent.deployment_tx_hashes() {
            if let Some(receipt) = self.provider.get_transaction_receipt(tx_hash).await? {
                if let Some(block_number) = receipt.block_number {
                    return Ok(Some((receipt, block_number)));
                }
            }
        }
        Ok(None)
    }

    /// Confirms a Safe whose code exists although none of its deployment
    /// txs has a receipt. The block the code was first seen at stands in
    /// for the mined block.
    async fn confirm_from_code(
        &self,
        intent: &SafeDeploymentIntent,
    ) -> Result<DeploymentStatus, SafeRelayError> {
        let safe = intent.safe;
        let current_block = self.provider.get_block_number().await?;
        let seen_block = match intent.code_seen_block {
            Some(block) => block,
            None => {
                self.deployments
                    .set_code_seen_block(safe, current_block)
                    .await?;
                current_block
            }
        };
        if current_block.saturating_sub(seen_block) < self.settings.confirmations {
            debug!(safe = %safe, seen_block, "safe code found, waiting for confirmations");
            return Ok(DeploymentStatus::Pending);
        }
        self.deployments.set_confirmed_block(safe, seen_block).await?;
        warn!(safe = %safe, block_number = seen_block, "safe deployment confirmed from its code, no receipt found");
        Ok(DeploymentStatus::Confirmed(seen_block))
    }

    async fn replace_deployment(
        &self,
        intent: &SafeDeploymentIntent,
        tx_hash: B256,
    ) -> Result<DeploymentStatus, SafeRelayError> {
        let safe = intent.safe;
        let (Some(nonce), Some(gas_price)) = (intent.tx_nonce, intent.tx_gas_price) else {
            return Err(SafeRelayError::Internal(format!(
                "deployment of {safe} has a tx hash without nonce or gas price"
            )));
        };
        let new_gas_price = bumped_gas_price(gas_price, self.settings.gas_bump_factor);

        let sent = match self
            .funder
            .replace(nonce, deployment_tx_params(intent, new_gas_price))
            .await
        {
            Ok(sent) => sent,
            Err(SafeRelayError::Provider(ProviderError::ReplacementUnderpriced(message))) => {
                warn!(safe = %safe, nonce, gas_price = new_gas_price, reason = %message, "safe deployment replacement underpriced");
                return Ok(DeploymentStatus::Pending);
            }
            Err(SafeRelayError::Provider(ProviderError::NonceTooLow(message))) => {
                // A tx with this nonce got mined; its receipt or the Safe code
                // confirms the deployment on a later check
                debug!(safe = %safe, nonce, reason = %message, "deployment nonce already used");
                return Ok(DeploymentStatus::Pending);
            }
            Err(e) => return Err(e),
        };

        self.deployments
            .set_tx_submission(
                safe,
                TxSubmission {
                    tx_hash: sent.hash,
                    nonce: sent.nonce,
                    gas_price: sent.gas_price,
                    submitted_at: now_rfc3339(),
                },
            )
            .await?;
        info!(
            safe = %safe,
            old_tx_hash = %tx_hash,
            tx_hash = %sent.hash,
            nonce,
            gas_price = new_gas_price,
            "safe deployment replaced"
        );
        Ok(DeploymentStatus::Replaced(sent.hash))
    }

    /// Periodic pass over every submitted but unconfirmed deployment.
    pub async fn check_pending_deployments(&self) -> Result<usize, SafeRelayError> {
        let pending = self.deployments.list_unconfirmed().await?;
        let mut confirmed = 0;
        for (intent, result) in pending
            .iter()
            .zip(join_all(pending.iter().map(|intent| self.check_deployment(intent))).await)
        {
            match result {
                Ok(DeploymentStatus::Confirmed(_)) => confirmed += 1,
                Ok(_) => {}
                Err(e) => warn!(safe = %intent.safe, error = %e, "safe deployment check failed"),
            }
        }
        Ok(confirmed)
    }
}
