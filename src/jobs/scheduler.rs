//! Cron scheduler of the periodic reconciler passes.
//!
//! Each task sleeps until its next cron tick, takes a task lock so only one
//! instance runs a pass at a time, and logs a failed pass without retrying
//! it: the next tick starts over from the persisted state.
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::constants::{
    CREATE2_CONFIRMATION_CRON_SCHEDULE, CREATE2_DEPLOY_CRON_SCHEDULE,
    GAS_PRICE_REFRESH_CRON_SCHEDULE, LEGACY_DEPLOY_CRON_SCHEDULE, LEGACY_FUND_CHECK_CRON_SCHEDULE,
    TASK_LOCK_TTL_SECS,
};
use crate::jobs::JobError;
use crate::models::{AppState, SafeRelayError};
use crate::services::{EvmProviderTrait, GasStationTrait};
use crate::utils::LockManager;

pub type TaskFuture = Pin<Box<dyn Future<Output = Result<(), JobError>> + Send>>;

pub struct Scheduler<P: EvmProviderTrait + 'static> {
    app_state: Arc<AppState<P>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<P: EvmProviderTrait + 'static> Scheduler<P> {
    pub fn new(app_state: Arc<AppState<P>>, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            app_state,
            shutdown_rx,
        }
    }

    fn spawn(
        &self,
        name: &str,
        cron_expr: &str,
        handler: impl Fn(Arc<AppState<P>>) -> TaskFuture + Send + Sync + 'static,
    ) -> Result<JoinHandle<()>, JobError> {
        spawn_cron_task(
            name,
            cron_expr,
            Duration::from_secs(TASK_LOCK_TTL_SECS),
            self.app_state.lock_manager.clone(),
            self.app_state.clone(),
            self.shutdown_rx.clone(),
            handler,
        )
    }

    /// Starts all periodic tasks and returns their handles.
    pub fn start(self) -> Result<Vec<JoinHandle<()>>, JobError> {
        let handles = vec![
            self.spawn("gas-price-refresh", GAS_PRICE_REFRESH_CRON_SCHEDULE, |state| {
                Box::pin(async move {
                    let prices = state
                        .gas_station
                        .refresh()
                        .await
                        .map_err(SafeRelayError::from)?;
                    debug!(standard = prices.standard, fast = prices.fast, "gas prices refreshed");
                    Ok::<(), JobError>(())
                })
            })?,
            self.spawn("legacy-fund-check", LEGACY_FUND_CHECK_CRON_SCHEDULE, |state| {
                Box::pin(async move {
                    let checked = state.legacy_reconciler.fund_pending_safes().await?;
                    debug!(checked, "legacy fund check pass done");
                    Ok::<(), JobError>(())
                })
            })?,
            self.spawn("legacy-deploy", LEGACY_DEPLOY_CRON_SCHEDULE, |state| {
                Box::pin(async move {
                    let deployed = state.legacy_reconciler.deploy_pending_safes().await?;
                    debug!(deployed, "legacy deploy pass done");
                    Ok::<(), JobError>(())
                })
            })?,
            self.spawn("create2-deploy", CREATE2_DEPLOY_CRON_SCHEDULE, |state| {
                Box::pin(async move {
                    let deployed = state.creation.deploy_funded_safes().await?;
                    debug!(deployed, "create2 deploy pass done");
                    Ok::<(), JobError>(())
                })
            })?,
            self.spawn("create2-confirmation", CREATE2_CONFIRMATION_CRON_SCHEDULE, |state| {
                Box::pin(async move {
                    let confirmed = state.create2_reconciler.check_pending_deployments().await?;
                    debug!(confirmed, "create2 confirmation pass done");
                    Ok::<(), JobError>(())
                })
            })?,
        ];

        info!(task_count = handles.len(), "scheduler started all tasks");
        Ok(handles)
    }
}

pub fn parse_schedule(name: &str, cron_expr: &str) -> Result<Schedule, JobError> {
    Schedule::from_str(cron_expr).map_err(|e| JobError::InvalidSchedule {
        task: name.to_string(),
        expression: cron_expr.to_string(),
        reason: e.to_string(),
    })
}

/// Spawns a single cron task that:
/// 1. Sleeps until the next occurrence (interruptible by shutdown)
/// 2. Takes the task lock (skips the tick if held elsewhere)
/// 3. Calls the handler
pub fn spawn_cron_task<S: Send + Sync + 'static>(
    name: &str,
    cron_expr: &str,
    lock_ttl: Duration,
    lock_manager: LockManager,
    state: Arc<S>,
    mut shutdown_rx: watch::Receiver<bool>,
    handler: impl Fn(Arc<S>) -> TaskFuture + Send + Sync + 'static,
) -> Result<JoinHandle<()>, JobError> {
    let schedule = parse_schedule(name, cron_expr)?;
    let task_name = name.to_string();
    let lock_name = format!("task:{name}");

    info!(
        name = %task_name,
        cron = %cron_expr,
        lock_ttl_secs = lock_ttl.as_secs(),
        "registering cron task"
    );

    let handle = tokio::spawn(async move {
        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                warn!(name = %task_name, "cron schedule exhausted, stopping task");
                break;
            };
            let until_next = (next - Utc::now())
                .to_std()
                .unwrap_or(Duration::from_secs(1));

            tokio::select! {
                _ = tokio::time::sleep(until_next) => {}
                _ = shutdown_rx.changed() => {
                    info!(name = %task_name, "shutdown signal received, stopping cron task");
                    break;
                }
            }
            if *shutdown_rx.borrow() {
                break;
            }

            match lock_manager.try_lock(&lock_name, lock_ttl).await {
                Ok(Some(guard)) => {
                    if let Err(e) = handler(state.clone()).await {
                        warn!(name = %task_name, error = %e, "scheduled task failed");
                    }
                    guard.release().await;
                }
                Ok(None) => {
                    debug!(name = %task_name, "task lock held elsewhere, skipping tick");
                }
                Err(e) => {
                    warn!(name = %task_name, error = %e, "failed to take task lock, skipping tick");
                }
            }
        }
        info!(name = %task_name, "cron task stopped");
    });

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_task_schedules_parse() {
        for expr in [
            GAS_PRICE_REFRESH_CRON_SCHEDULE,
            LEGACY_FUND_CHECK_CRON_SCHEDULE,
            LEGACY_DEPLOY_CRON_SCHEDULE,
            CREATE2_DEPLOY_CRON_SCHEDULE,
            CREATE2_CONFIRMATION_CRON_SCHEDULE,
        ] {
            assert!(parse_schedule("task", expr).is_ok(), "{expr}");
        }
        assert!(matches!(
            parse_schedule("task", "every minute"),
            Err(JobError::InvalidSchedule { .. })
        ));
    }

    fn counting_task(
        lock_manager: LockManager,
        counter: Arc<AtomicUsize>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        spawn_cron_task(
            "counter",
            "* * * * * *",
            Duration::from_secs(5),
            lock_manager,
            counter,
            shutdown_rx,
            |counter| {
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), JobError>(())
                })
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_cron_task_runs_and_stops_on_shutdown() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = counting_task(LockManager::new_in_memory(), counter.clone(), shutdown_rx);

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert!(counter.load(Ordering::SeqCst) >= 1);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_cron_task_skips_while_lock_is_held() {
        let counter = Arc::new(AtomicUsize::new(0));
        let lock_manager = LockManager::new_in_memory();
        let guard = lock_manager
            .try_lock("task:counter", Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = counting_task(lock_manager, counter.clone(), shutdown_rx);

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        guard.release().await;
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(counter.load(Ordering::SeqCst) >= 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
