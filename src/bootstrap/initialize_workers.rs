//! Worker initialization
use std::sync::Arc;

use tokio::{sync::watch, task::JoinHandle};
use tracing::info;

use crate::{
    jobs::{JobError, JobReceiver, JobWorker, Scheduler},
    models::AppState,
    services::EvmProviderTrait,
};

/// Starts the job worker and all cron tasks.
///
/// # Arguments
/// * `app_state` - Shared services
/// * `receiver` - Receiving end of the job channel created with the app state
/// * `shutdown_rx` - Flips to `true` when the process shuts down
///
/// # Returns
/// Handles of every spawned task
pub fn initialize_workers<P: EvmProviderTrait + 'static>(
    app_state: Arc<AppState<P>>,
    receiver: JobReceiver,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<Vec<JoinHandle<()>>, JobError> {
    let mut handles = vec![JobWorker::new(app_state.clone(), receiver, shutdown_rx.clone()).start()];
    handles.extend(Scheduler::new(app_state, shutdown_rx).start()?);

    info!(worker_count = handles.len(), "initialized workers");
    Ok(handles)
}
