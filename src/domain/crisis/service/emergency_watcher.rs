use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::core::persistence::alerts::crisis_alert_entity::{CrisisAlert, AUTO_TRIGGER};
use crate::domain::crisis::feed::alert_feed::AlertUpdateKind;
use crate::domain::crisis::model::audit_event::{EVENT_EMERGENCY_CALL, EVENT_ESCALATED};
use crate::domain::crisis::service::crisis_service::CrisisService;
use crate::errors::CrisisError;
use crate::scheduler::task_supervisor::wait_for_shutdown;

pub const NO_ACK_REASON: &str = "No acknowledgment within deadline";

pub fn watch_key(alert_id: &str) -> String {
    format!("emergency-watch:{alert_id}")
}

/// Arms the one-shot emergency check for an IMMEDIATE alert. A second call
/// for the same alert while the first is pending does nothing.
pub(crate) fn schedule(service: &CrisisService, alert: &CrisisAlert) {
    let svc = service.clone();
    let alert_id = alert.id.clone();
    let delay = service.config.escalation_delays.immediate;
    let mut shutdown = service.supervisor.shutdown_signal();

    let scheduled = service.supervisor.spawn_keyed(watch_key(&alert.id), async move {
        tokio::select! {
            _ = sleep(delay) => {}
            _ = wait_for_shutdown(&mut shutdown) => {
                debug!(%alert_id, "Emergency watch cancelled by shutdown");
                return;
            }
        }

        if !svc.config.enable_emergency_auto_call {
            info!(%alert_id, "Emergency auto-call disabled; leaving alert to the escalation monitor");
            return;
        }

        if let Err(e) = invoke_emergency_protocol(&svc, &alert_id, NO_ACK_REASON, Utc::now(), true).await {
            error!(%alert_id, error = %e, "Emergency protocol failed");
        }
    });

    if scheduled {
        debug!(alert_id = %alert.id, ?delay, "Emergency watch scheduled");
    } else {
        debug!(alert_id = %alert.id, "Emergency watch already pending");
    }
}

/// Claims the EMERGENCY_PROTOCOL transition under the alert's lock, then
/// hands the emergency call to a background task when `place_call` is set.
///
/// Returns `Ok(false)` when the alert was already picked up, so no call is
/// ever placed after an acknowledgment.
pub(crate) async fn invoke_emergency_protocol(
    service: &CrisisService,
    alert_id: &str,
    reason: &str,
    now: DateTime<Utc>,
    place_call: bool,
) -> Result<bool, CrisisError> {
    let (alert, escalation) = match service
        .store
        .update(alert_id, |a| a.invoke_emergency_protocol(reason, now))
        .await
    {
        Ok(claimed) => claimed,
        Err(CrisisError::InvalidState(detail)) => {
            debug!(alert_id, detail, "Emergency protocol not needed");
            return Ok(false);
        }
        Err(e) => return Err(e),
    };

    warn!(
        alert_id,
        user_id = %alert.user_id,
        reason,
        "No acknowledgment received; emergency protocol invoked"
    );

    service.audit(
        &alert,
        EVENT_ESCALATED,
        AUTO_TRIGGER,
        json!({
            "from_severity": escalation.from_severity,
            "to_severity": escalation.to_severity,
            "action": escalation.action,
            "reason": escalation.reason,
        }),
    );
    service.publish(AlertUpdateKind::EmergencyProtocol, &alert, now);

    if place_call {
        dispatch_emergency_call(service, alert).await;
    }

    Ok(true)
}

/// The call runs as its own supervised task so a slow gateway never holds up
/// the caller. Once shutdown has begun the supervisor takes no new work and
/// the call is placed inline instead.
async fn dispatch_emergency_call(service: &CrisisService, alert: CrisisAlert) {
    let svc = service.clone();
    let task_alert = alert.clone();
    let spawned = service
        .supervisor
        .spawn(async move { place_emergency_call(&svc, &task_alert).await });

    if !spawned {
        warn!(alert_id = %alert.id, "Shutdown in progress; placing emergency call inline");
        place_emergency_call(service, &alert).await;
    }
}

async fn place_emergency_call(service: &CrisisService, alert: &CrisisAlert) {
    let contacts = match service.care_team.get_emergency_contacts(&alert.user_id).await {
        Ok(contacts) => contacts,
        Err(e) => {
            error!(
                alert_id = %alert.id,
                error = %format!("{e:#}"),
                "Emergency contact lookup failed; emergency call not placed"
            );
            return;
        }
    };

    if contacts.is_empty() {
        warn!(alert_id = %alert.id, "No emergency contacts on file; emergency call not placed");
        return;
    }

    let number = service.config.emergency_number.as_str();
    let placed = service.notifications.place_emergency_call(number, alert).await;

    service.audit(
        alert,
        EVENT_EMERGENCY_CALL,
        AUTO_TRIGGER,
        json!({
            "number": number,
            "placed": placed,
            "emergency_contacts": contacts.len(),
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::persistence::alerts::crisis_alert_entity::{AlertStatus, Severity};
    use crate::domain::crisis::service::crisis_service::tests::{context, harness, settle};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn duplicate_schedule_is_ignored() {
        let h = harness(Severity::Immediate);
        let alert = h.service.analyze("suicide", context()).await.unwrap().unwrap();

        schedule(&h.service, &alert);
        schedule(&h.service, &alert);
        sleep(Duration::from_secs(16)).await;

        let current = h.service.get_alert(&alert.id).unwrap();
        assert_eq!(current.escalations.len(), 1);
        assert_eq!(h.notifier.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_call_without_emergency_contacts() {
        let h = harness(Severity::Immediate);
        h.care_team.contacts.lock().unwrap().clear();
        let alert = h.service.analyze("suicide", context()).await.unwrap().unwrap();

        sleep(Duration::from_secs(16)).await;

        assert_eq!(h.service.get_alert(&alert.id).unwrap().status, AlertStatus::Escalated);
        assert!(h.notifier.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn protocol_is_claimed_once() {
        let h = harness(Severity::Immediate);
        let alert = h.service.analyze("suicide", context()).await.unwrap().unwrap();

        let now = Utc::now();
        assert!(invoke_emergency_protocol(&h.service, &alert.id, NO_ACK_REASON, now, true)
            .await
            .unwrap());
        assert!(!invoke_emergency_protocol(&h.service, &alert.id, NO_ACK_REASON, now, true)
            .await
            .unwrap());

        settle().await;
        assert_eq!(h.notifier.calls().len(), 1);
        let events = h.audit.event_types();
        assert!(events.contains(&EVENT_ESCALATED.to_string()));
        assert!(events.contains(&EVENT_EMERGENCY_CALL.to_string()));
    }
}
