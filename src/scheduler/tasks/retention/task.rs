use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::domain::crisis::service::crisis_service::CrisisService;
use crate::scheduler::task_supervisor::wait_for_shutdown;

/// Deletes alert records past retention, whatever their status.
pub async fn run(service: CrisisService, mut shutdown: watch::Receiver<bool>) {
    let period = service.config().retention_sweep_interval;
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = wait_for_shutdown(&mut shutdown) => {
                debug!("Retention sweeper stopped");
                return;
            }
        }

        match service.purge_expired(Utc::now()) {
            Ok(purged) if purged.is_empty() => debug!("Retention sweep: nothing expired"),
            Ok(purged) => info!(purged = purged.len(), "Expired alert records deleted"),
            Err(e) => error!(error = %format!("{e:#}"), "Retention sweep failed; retrying next tick"),
        }
    }
}
