use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::domain::crisis::service::crisis_service::CrisisService;
use crate::domain::crisis::service::escalation_service::escalate_overdue;
use crate::scheduler::task_supervisor::wait_for_shutdown;

/// Escalation monitor: one sweep of the open index per tick.
pub async fn run(service: CrisisService, mut shutdown: watch::Receiver<bool>) {
    let period = service.config().monitor_interval;
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(?period, "Escalation monitor started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = wait_for_shutdown(&mut shutdown) => {
                info!("Escalation monitor stopped");
                return;
            }
        }

        let report = escalate_overdue(&service, Utc::now()).await;
        if report.escalated + report.emergency + report.failed > 0 {
            info!(
                overdue = report.overdue,
                escalated = report.escalated,
                emergency = report.emergency,
                skipped = report.skipped,
                failed = report.failed,
                "Escalation sweep"
            );
        } else {
            debug!(overdue = report.overdue, "Escalation sweep: nothing to do");
        }
    }
}
