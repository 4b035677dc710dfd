//! Two-phase reconciliation of Safes deployed through a one-shot deployer.
//!
//! The funder first waits for the Safe to hold its payment, then sends the
//! deployer the ether it needs, and finally the pre-signed creation tx of
//! the deployer is broadcast. Lost funding and deploy txs are detected and
//! their hashes cleared so the step is taken again.
//!
//! Funding steps hold a per-Safe lock: the periodic pass and an on-demand
//! job may reach the same Safe at once.
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use super::{has_confirmations, try_safe_step_lock, ReconcilerSettings};
use crate::constants::DEPLOYER_FUNDED_CHECK_COUNTDOWN_SECS;
use crate::jobs::JobProducerTrait;
use crate::models::{
    LegacyFundingRecord, LegacyFundingState, LegacyFundingUpdate, LegacySafeCreation,
    SafeRelayError,
};
use crate::repositories::{LegacyFundingRepositoryStorage, LegacyFundingRepositoryTrait};
use crate::services::{EvmProviderTrait, FundingService, ProviderError};
use crate::utils::{is_older_than, LockManager};

const FUND_DEPLOYER_STEP: &str = "fund_deployer";
const CHECK_DEPLOYER_FUNDED_STEP: &str = "check_deployer_funded";

pub struct LegacyReconciler<P: EvmProviderTrait, J: JobProducerTrait> {
    provider: Arc<P>,
    legacy: Arc<LegacyFundingRepositoryStorage>,
    funding: Arc<FundingService<P>>,
    job_producer: Arc<J>,
    lock_manager: LockManager,
    settings: ReconcilerSettings,
}

impl<P: EvmProviderTrait, J: JobProducerTrait> LegacyReconciler<P, J> {
    pub fn new(
        provider: Arc<P>,
        legacy: Arc<LegacyFundingRepositoryStorage>,
        funding: Arc<FundingService<P>>,
        job_producer: Arc<J>,
        lock_manager: LockManager,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            provider,
            legacy,
            funding,
            job_producer,
            lock_manager,
            settings,
        }
    }

    async fn update(
        &self,
        safe: Address,
        update: LegacyFundingUpdate,
    ) -> Result<LegacyFundingRecord, SafeRelayError> {
        Ok(self.legacy.update_funding(safe, update).await?)
    }

    /// Balance the Safe holds in its payment currency at `block`.
    async fn safe_balance(
        &self,
        creation: &LegacySafeCreation,
        block: u64,
    ) -> Result<U256, SafeRelayError> {
        let balance = match creation.payment_token() {
            Some(token) => {
                self.provider
                    .get_token_balance(token, creation.safe, Some(block))
                    .await?
            }
            None => self.provider.get_balance(creation.safe, Some(block)).await?,
        };
        Ok(balance)
    }

    /// Ether the deployer needs. A Safe paying in ether refunds the whole
    /// payment to the deployer, a token payment only covers the deploy gas.
    fn deployer_funding_amount(creation: &LegacySafeCreation) -> U256 {
        match creation.payment_token() {
            Some(_) => creation.deploy_cost(),
            None => creation.payment,
        }
    }

    async fn signal_deployer_check(&self, safe: Address, delay: Option<Duration>) {
        if let Err(e) = self
            .job_producer
            .produce_check_deployer_funded_job(safe, delay)
            .await
        {
            error!(safe = %safe, error = %e, "failed to signal deployer funding check");
        }
    }

    /// Delay before the receipt check following `attempts` misses.
    fn deployer_check_delay(&self, attempts: u32) -> u64 {
        if attempts == 0 {
            DEPLOYER_FUNDED_CHECK_COUNTDOWN_SECS
        } else {
            u64::from(attempts) * 10 + self.settings.deployer_check_delay_secs
        }
    }

    /// Whether the receipt checks of a sent deployer funding stopped. A live
    /// check touches the record at least once per delay.
    fn deployer_check_stalled(&self, record: &LegacyFundingRecord) -> bool {
        let delay = self.deployer_check_delay(record.deployer_check_attempts);
        is_older_than(
            &record.modified_at,
            chrono::Duration::seconds(2 * delay as i64),
        )
    }

    /// Checks the Safe funding and funds the deployer once the Safe holds
    /// its payment.
    ///
    /// Exits with the stored state when the step already runs for `safe`.
    pub async fn fund_deployer(&self, safe: Address) -> Result<LegacyFundingState, SafeRelayError> {
        let Some(guard) = try_safe_step_lock(&self.lock_manager, FUND_DEPLOYER_STEP, safe).await?
        else {
            debug!(safe = %safe, "deployer funding already running");
            return Ok(self.legacy.get_or_create_funding(safe).await?.state());
        };
        let result = self.fund_deployer_locked(safe).await;
        guard.release().await;
        result
    }

    async fn fund_deployer_locked(
        &self,
        safe: Address,
    ) -> Result<LegacyFundingState, SafeRelayError> {
        let creation = self.legacy.get_creation(safe).await?;
        let mut record = self.legacy.get_or_create_funding(safe).await?;

        if record.is_all_funded() {
            debug!(safe = %safe, "safe and deployer already funded");
            return Ok(record.state());
        }

        if record.deployer_funded_tx_hash.is_some() {
            // Transfer already sent; its receipt check re-signals itself
            if self.deployer_check_stalled(&record) {
                info!(safe = %safe, "deployer funding check stalled, signalling it again");
                self.signal_deployer_check(safe, None).await;
            }
            return Ok(record.state());
        }

        if !record.safe_funded {
            let current_block = self.provider.get_block_number().await?;
            let block = current_block.saturating_sub(self.settings.confirmations);
            let balance = self.safe_balance(&creation, block).await?;
            if balance < creation.payment {
                debug!(
                    safe = %safe,
                    balance = %balance,
                    payment = %creation.payment,
                    block,
                    "safe not funded yet"
                );
                return Ok(record.state());
            }
            info!(safe = %safe, balance = %balance, "safe funded");
            record = self
                .update(
                    safe,
                    LegacyFundingUpdate {
                        safe_funded: Some(true),
                        ..Default::default()
                    },
                )
                .await?;
        }

        let deployer_balance = self.provider.get_balance(creation.deployer, None).await?;
        if !deployer_balance.is_zero() {
            error!(
                safe = %safe,
                deployer = %creation.deployer,
                balance = %deployer_balance,
                "deployer already holds ether, skipping funding"
            );
            return Ok(record.state());
        }

        let amount = Self::deployer_funding_amount(&creation);
        let tx_hash = self
            .funding
            .send_eth_to(creation.deployer, amount, Some(creation.gas_price))
            .await?;
        let record = self
            .update(
                safe,
                LegacyFundingUpdate {
                    deployer_funded_tx_hash: Some(Some(tx_hash)),
                    deployer_check_attempts: Some(0),
                    ..Default::default()
                },
            )
            .await?;
        info!(
            safe = %safe,
            deployer = %creation.deployer,
            amount = %amount,
            tx_hash = %tx_hash,
            "deployer funding sent"
        );
        self.signal_deployer_check(
            safe,
            Some(Duration::from_secs(self.deployer_check_delay(0))),
        )
        .await;
        Ok(record.state())
    }

    /// Polls the receipt of the deployer funding transfer.
    ///
    /// Each miss is persisted and re-signalled with a growing delay. Once the
    /// budget is spent the deployer balance decides: enough for the deploy
    /// counts as funded, anything less clears the transfer so it is sent again.
    pub async fn check_deployer_funded(
        &self,
        safe: Address,
    ) -> Result<LegacyFundingState, SafeRelayError> {
        let Some(guard) =
            try_safe_step_lock(&self.lock_manager, CHECK_DEPLOYER_FUNDED_STEP, safe).await?
        else {
            debug!(safe = %safe, "deployer funding check already running");
            return Ok(self.legacy.get_funding(safe).await?.state());
        };
        let result = self.check_deployer_funded_locked(safe).await;
        guard.release().await;
        result
    }

    async fn check_deployer_funded_locked(
        &self,
        safe: Address,
    ) -> Result<LegacyFundingState, SafeRelayError> {
        let record = self.legacy.get_funding(safe).await?;
        if record.deployer_funded {
            warn!(safe = %safe, "deployer already funded");
            return Ok(record.state());
        }
        let Some(tx_hash) = record.deployer_funded_tx_hash else {
            error!(safe = %safe, "no deployer funding tx to check");
            return Ok(record.state());
        };

        if let Some(receipt) = self.provider.get_transaction_receipt(tx_hash).await? {
            if receipt.block_number.is_some() {
                let record = self
                    .update(
                        safe,
                        LegacyFundingUpdate {
                            deployer_funded: Some(true),
                            ..Default::default()
                        },
                    )
                    .await?;
                info!(safe = %safe, tx_hash = %tx_hash, "deployer funded");
                return Ok(record.state());
            }
        }

        let attempts = record.deployer_check_attempts + 1;
        if attempts < self.settings.deployer_check_retries {
            self.update(
                safe,
                LegacyFundingUpdate {
                    deployer_check_attempts: Some(attempts),
                    ..Default::default()
                },
            )
            .await?;
            let delay = self.deployer_check_delay(attempts);
            debug!(safe = %safe, tx_hash = %tx_hash, attempts, delay, "deployer funding not mined yet");
            self.signal_deployer_check(safe, Some(Duration::from_secs(delay)))
                .await;
            return Ok(record.state());
        }

        let creation = self.legacy.get_creation(safe).await?;
        let balance = self.provider.get_balance(creation.deployer, None).await?;
        let update = if balance >= creation.deploy_cost() {
            info!(safe = %safe, balance = %balance, "deployer funding receipt missing but balance covers deploy");
            LegacyFundingUpdate {
                deployer_funded: Some(true),
                deployer_check_attempts: Some(attempts),
                ..Default::default()
            }
        } else {
            warn!(
                safe = %safe,
                tx_hash = %tx_hash,
                balance = %balance,
                "deployer funding tx lost, clearing it"
            );
            LegacyFundingUpdate {
                deployer_funded_tx_hash: Some(None),
                deployer_check_attempts: Some(0),
                ..Default::default()
            }
        };
        Ok(self.update(safe, update).await?.state())
    }

    /// Whether the deployer can still pay for its creation tx.
    async fn deployer_funding_holds(
        &self,
        record: &LegacyFundingRecord,
        creation: &LegacySafeCreation,
    ) -> Result<bool, SafeRelayError> {
        if let Some(tx_hash) = record.deployer_funded_tx_hash {
            if self
                .provider
                .get_transaction_receipt(tx_hash)
                .await?
                .is_some_and(|receipt| receipt.block_number.is_some())
            {
                return Ok(true);
            }
        }
        let balance = self.provider.get_balance(creation.deployer, None).await?;
        Ok(balance >= creation.deploy_cost())
    }

    /// Sends or confirms the creation tx of a fully funded legacy Safe.
    pub async fn deploy_safe(&self, safe: Address) -> Result<LegacyFundingState, SafeRelayError> {
        let record = self.legacy.get_funding(safe).await?;
        if record.safe_deployed || record.safe_deploy_reverted {
            return Ok(record.state());
        }
        if !record.is_all_funded() {
            debug!(safe = %safe, state = %record.state(), "safe not ready to deploy");
            return Ok(record.state());
        }

        if let Some(tx_hash) = record.safe_deployed_tx_hash {
            return self.confirm_deployment(&record, tx_hash).await;
        }

        let creation = self.legacy.get_creation(safe).await?;
        if !self.deployer_funding_holds(&record, &creation).await? {
            warn!(safe = %safe, "deployer funding vanished, funding again");
            let record = self
                .update(
                    safe,
                    LegacyFundingUpdate {
                        deployer_funded: Some(false),
                        deployer_funded_tx_hash: Some(None),
                        deployer_check_attempts: Some(0),
                        ..Default::default()
                    },
                )
                .await?;
            return Ok(record.state());
        }

        match self.provider.send_raw_transaction(&creation.signed_tx).await {
            Ok(tx_hash) => {
                let record = self
                    .update(
                        safe,
                        LegacyFundingUpdate {
                            safe_deployed_tx_hash: Some(Some(tx_hash)),
                            ..Default::default()
                        },
                    )
                    .await?;
                info!(safe = %safe, deployer = %creation.deployer, tx_hash = %tx_hash, "safe creation tx sent");
                Ok(record.state())
            }
            Err(ProviderError::InsufficientFunds(message)) => {
                warn!(safe = %safe, reason = %message, "deployer cannot pay for creation, funding again");
                let record = self
                    .update(
                        safe,
                        LegacyFundingUpdate {
                            deployer_funded: Some(false),
                            deployer_funded_tx_hash: Some(None),
                            deployer_check_attempts: Some(0),
                            ..Default::default()
                        },
                    )
                    .await?;
                if let Err(e) = self
                    .job_producer
                    .produce_fund_deployer_job(safe, None)
                    .await
                {
                    error!(safe = %safe, error = %e, "failed to signal fund deployer");
                }
                Ok(record.state())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn confirm_deployment(
        &self,
        record: &LegacyFundingRecord,
        tx_hash: B256,
    ) -> Result<LegacyFundingState, SafeRelayError> {
        let safe = record.safe;
        match self.provider.get_transaction_receipt(tx_hash).await? {
            Some(receipt) if receipt.block_number.is_some() => {
                let current_block = self.provider.get_block_number().await?;
                if !has_confirmations(&receipt, current_block, self.settings.confirmations) {
                    debug!(safe = %safe, tx_hash = %tx_hash, "safe creation waiting for confirmations");
                    return Ok(record.state());
                }
                if !receipt.status {
                    // The deployer nonce is spent, the signed creation cannot be sent again
                    error!(safe = %safe, tx_hash = %tx_hash, "safe creation tx reverted");
                    let record = self
                        .update(
                            safe,
                            LegacyFundingUpdate {
                                safe_deploy_reverted: Some(true),
                                ..Default::default()
                            },
                        )
                        .await?;
                    return Ok(record.state());
                }
                let record = self
                    .update(
                        safe,
                        LegacyFundingUpdate {
                            safe_deployed: Some(true),
                            ..Default::default()
                        },
                    )
                    .await?;
                info!(safe = %safe, tx_hash = %tx_hash, "safe deployed");
                Ok(record.state())
            }
            _ if is_older_than(&record.modified_at, self.settings.legacy_deploy_timeout) => {
                warn!(safe = %safe, tx_hash = %tx_hash, "safe creation tx not mined in time, clearing it");
                let record = self
                    .update(
                        safe,
                        LegacyFundingUpdate {
                            safe_deployed_tx_hash: Some(None),
                            ..Default::default()
                        },
                    )
                    .await?;
                Ok(record.state())
            }
            _ => {
                debug!(safe = %safe, tx_hash = %tx_hash, "safe creation tx pending");
                Ok(record.state())
            }
        }
    }

    /// Periodic pass over Safes waiting for funding.
    pub async fn fund_pending_safes(&self) -> Result<usize, SafeRelayError> {
        let pending = self.legacy.list_pending_funding().await?;
        let count = pending.len();
        for result in join_all(pending.iter().map(|record| self.fund_deployer(record.safe))).await {
            if let Err(e) = result {
                warn!(error = %e, "legacy funding check failed");
            }
        }
        Ok(count)
    }

    /// Periodic pass over fully funded Safes waiting for their deployment.
    pub async fn deploy_pending_safes(&self) -> Result<usize, SafeRelayError> {
        let pending = self.legacy.list_pending_deploy().await?;
        let count = pending.len();
        for result in join_all(pending.iter().map(|record| self.deploy_safe(record.safe))).await {
            if let Err(e) = result {
                warn!(error = %e, "legacy deployment step failed");
            }
        }
        Ok(count)
    }
}
