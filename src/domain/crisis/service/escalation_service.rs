use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info};

use crate::core::persistence::alerts::crisis_alert_entity::{CrisisAlert, Severity, AUTO_TRIGGER};
use crate::domain::crisis::feed::alert_feed::AlertUpdateKind;
use crate::domain::crisis::model::audit_event::EVENT_ESCALATED;
use crate::domain::crisis::service::crisis_service::CrisisService;
use crate::domain::crisis::service::emergency_watcher::invoke_emergency_protocol;
use crate::errors::CrisisError;

pub const DEADLINE_EXCEEDED_REASON: &str = "Response deadline exceeded";

/// Counts for one pass over the open index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EscalationSweepReport {
    pub overdue: usize,
    pub escalated: usize,
    pub emergency: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationOutcome {
    Raised(Severity),
    EmergencyProtocol,
    /// Acknowledged, resolved or already moved since the snapshot.
    Skipped,
}

/// Escalates every open alert that is past its deadline with no response.
///
/// Works from a snapshot of the open index; each alert is re-checked under
/// its own lock before anything changes.
pub async fn escalate_overdue(service: &CrisisService, now: DateTime<Utc>) -> EscalationSweepReport {
    let mut report = EscalationSweepReport::default();

    let overdue: Vec<CrisisAlert> = service
        .store
        .list_open()
        .into_iter()
        .filter(|a| a.is_overdue(now))
        .collect();
    report.overdue = overdue.len();

    for alert in &overdue {
        match escalate_alert(service, alert, now).await {
            Ok(EscalationOutcome::Raised(_)) => report.escalated += 1,
            Ok(EscalationOutcome::EmergencyProtocol) => report.emergency += 1,
            Ok(EscalationOutcome::Skipped) => report.skipped += 1,
            Err(e) => {
                report.failed += 1;
                error!(alert_id = %alert.id, error = %e, "Escalation failed; retrying next tick");
            }
        }
    }

    report
}

/// Moves one overdue alert up the ladder, or into the emergency protocol
/// once it is already IMMEDIATE. `snapshot` is only used to pick the path.
pub async fn escalate_alert(
    service: &CrisisService,
    snapshot: &CrisisAlert,
    now: DateTime<Utc>,
) -> Result<EscalationOutcome, CrisisError> {
    let Some(next) = snapshot.severity.next_tier() else {
        let place_call = service.config.enable_emergency_auto_call;
        let claimed =
            invoke_emergency_protocol(service, &snapshot.id, DEADLINE_EXCEEDED_REASON, now, place_call).await?;
        return Ok(if claimed {
            EscalationOutcome::EmergencyProtocol
        } else {
            EscalationOutcome::Skipped
        });
    };

    let timeout = service.config.response_timeout(next).ok_or_else(|| {
        CrisisError::InvalidState(format!("no response timeout for {}", next.as_code()))
    })?;

    let result = service
        .store
        .update(&snapshot.id, |a| {
            if !a.is_overdue(now) || a.severity.next_tier() != Some(next) {
                return Err(CrisisError::InvalidState(format!(
                    "alert {} is {} at {}; no longer overdue",
                    a.id,
                    a.status.as_code(),
                    a.severity.as_code()
                )));
            }
            a.raise_severity(next, timeout, DEADLINE_EXCEEDED_REASON, AUTO_TRIGGER, now)
        })
        .await;

    let (alert, escalation) = match result {
        Ok(escalated) => escalated,
        Err(CrisisError::InvalidState(detail)) => {
            debug!(alert_id = %snapshot.id, detail, "Skipping escalation");
            return Ok(EscalationOutcome::Skipped);
        }
        Err(e) => return Err(e),
    };

    info!(
        alert_id = %alert.id,
        from = escalation.from_severity.as_code(),
        to = escalation.to_severity.as_code(),
        "Alert escalated after missed deadline"
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
    service.publish(AlertUpdateKind::Escalated, &alert, now);
    service.spawn_response_initiation(alert);

    Ok(EscalationOutcome::Raised(next))
}
