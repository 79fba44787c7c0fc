use std::collections::BTreeMap;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::CrisisError;

/// Actor recorded on escalations performed by the engine itself.
pub const AUTO_TRIGGER: &str = "auto";

/// Crisis severity, ordered by urgency.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    None,
    Moderate,
    Elevated,
    Urgent,
    Immediate,
}

impl Severity {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Moderate => "MODERATE",
            Self::Elevated => "ELEVATED",
            Self::Urgent => "URGENT",
            Self::Immediate => "IMMEDIATE",
        }
    }

    /// Next tier on the escalation ladder. `None` at the top of the ladder,
    /// where the emergency protocol takes over.
    pub fn next_tier(&self) -> Option<Self> {
        match self {
            Self::None => None,
            Self::Moderate => Some(Self::Elevated),
            Self::Elevated => Some(Self::Urgent),
            Self::Urgent => Some(Self::Immediate),
            Self::Immediate => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    InProgress,
    Resolved,
    Escalated,
}

impl AlertStatus {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Acknowledged => "ACKNOWLEDGED",
            Self::InProgress => "IN_PROGRESS",
            Self::Resolved => "RESOLVED",
            Self::Escalated => "ESCALATED",
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Resolved)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationAction {
    /// Alert moved one tier up the ladder.
    SeverityRaised,
    /// Top tier exhausted: emergency services were engaged.
    EmergencyProtocol,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Acknowledgment {
    pub user_id: String,
    pub role: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Escalation {
    pub from_severity: Severity,
    pub to_severity: Severity,
    pub action: EscalationAction,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    /// Responder ID, or [`AUTO_TRIGGER`] when the engine escalated.
    pub triggered_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resolution {
    pub resolved_by: String,
    pub resolved_at: DateTime<Utc>,
    pub note: String,
}

/// A single tracked crisis event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrisisAlert {
    pub id: String,
    pub user_id: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility_id: Option<String>,

    pub severity: Severity,
    pub confidence_score: f64,
    pub trigger_message: String,
    pub detected_patterns: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
    /// Assessment scores and other free-form clinical context.
    #[serde(default)]
    pub clinical_context: BTreeMap<String, Value>,

    pub created_at: DateTime<Utc>,
    pub response_deadline: DateTime<Utc>,
    pub status: AlertStatus,

    #[serde(default)]
    pub assigned_to: Vec<String>,
    #[serde(default)]
    pub acknowledgments: Vec<Acknowledgment>,
    #[serde(default)]
    pub escalations: Vec<Escalation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
}

/// `now + timeout`, saturating instead of overflowing.
pub fn deadline_from(now: DateTime<Utc>, timeout: StdDuration) -> DateTime<Utc> {
    Duration::from_std(timeout)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl CrisisAlert {
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Still waiting on a first responder after its deadline.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == AlertStatus::Active
            && self.acknowledgments.is_empty()
            && now > self.response_deadline
    }

    /// Eligible for the emergency protocol: nobody has picked it up yet.
    pub fn is_unanswered(&self) -> bool {
        self.status == AlertStatus::Active && self.acknowledgments.is_empty()
    }

    pub fn acknowledge(&mut self, ack: Acknowledgment) -> Result<(), CrisisError> {
        if !matches!(self.status, AlertStatus::Active | AlertStatus::Acknowledged) {
            return Err(CrisisError::InvalidState(format!(
                "alert {} is {} and cannot be acknowledged",
                self.id,
                self.status.as_code()
            )));
        }

        self.acknowledgments.push(ack);
        self.status = AlertStatus::Acknowledged;
        Ok(())
    }

    pub fn mark_in_progress(&mut self) -> Result<(), CrisisError> {
        if self.status != AlertStatus::Acknowledged {
            return Err(CrisisError::InvalidState(format!(
                "alert {} is {}; only acknowledged alerts can move to IN_PROGRESS",
                self.id,
                self.status.as_code()
            )));
        }

        self.status = AlertStatus::InProgress;
        Ok(())
    }

    pub fn resolve(&mut self, resolution: Resolution) -> Result<(), CrisisError> {
        if self.status == AlertStatus::Resolved {
            return Err(CrisisError::InvalidState(format!(
                "alert {} is already resolved",
                self.id
            )));
        }

        self.clinical_context
            .insert("resolution".into(), Value::String(resolution.note.clone()));
        self.clinical_context
            .insert("resolved_by".into(), Value::String(resolution.resolved_by.clone()));
        self.clinical_context.insert(
            "resolved_at".into(),
            Value::String(resolution.resolved_at.to_rfc3339()),
        );
        self.resolution = Some(resolution);
        self.status = AlertStatus::Resolved;
        Ok(())
    }

    /// Moves the alert one tier up and restarts its response clock from `now`.
    /// Status stays ACTIVE so the new tier gets its own deadline.
    pub fn raise_severity(
        &mut self,
        to: Severity,
        timeout: StdDuration,
        reason: &str,
        triggered_by: &str,
        now: DateTime<Utc>,
    ) -> Result<Escalation, CrisisError> {
        if to <= self.severity {
            return Err(CrisisError::InvalidState(format!(
                "cannot escalate alert {} from {} to {}",
                self.id,
                self.severity.as_code(),
                to.as_code()
            )));
        }

        let escalation = Escalation {
            from_severity: self.severity,
            to_severity: to,
            action: EscalationAction::SeverityRaised,
            reason: reason.to_string(),
            timestamp: now,
            triggered_by: triggered_by.to_string(),
        };

        self.escalations.push(escalation.clone());
        self.severity = to;
        self.response_deadline = deadline_from(now, timeout);
        Ok(escalation)
    }

    /// Records that emergency services were engaged. Terminal for automatic
    /// processing: the alert leaves ACTIVE.
    pub fn invoke_emergency_protocol(
        &mut self,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Escalation, CrisisError> {
        if !self.is_unanswered() {
            return Err(CrisisError::InvalidState(format!(
                "alert {} is {} with {} acknowledgment(s); emergency protocol not applicable",
                self.id,
                self.status.as_code(),
                self.acknowledgments.len()
            )));
        }

        let escalation = Escalation {
            from_severity: self.severity,
            to_severity: Severity::Immediate,
            action: EscalationAction::EmergencyProtocol,
            reason: reason.to_string(),
            timestamp: now,
            triggered_by: AUTO_TRIGGER.to_string(),
        };

        self.escalations.push(escalation.clone());
        self.severity = Severity::Immediate;
        self.status = AlertStatus::Escalated;
        Ok(escalation)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_alert(severity: Severity, now: DateTime<Utc>) -> CrisisAlert {
        CrisisAlert {
            id: "alert-1".into(),
            user_id: "resident-1".into(),
            session_id: "session-1".into(),
            facility_id: Some("facility-1".into()),
            severity,
            confidence_score: 0.9,
            trigger_message: "I can't go on".into(),
            detected_patterns: vec!["hopelessness".into()],
            reasoning: String::new(),
            clinical_context: BTreeMap::new(),
            created_at: now,
            response_deadline: deadline_from(now, StdDuration::from_secs(30)),
            status: AlertStatus::Active,
            assigned_to: Vec::new(),
            acknowledgments: Vec::new(),
            escalations: Vec::new(),
            resolution: None,
        }
    }

    fn ack(user: &str, now: DateTime<Utc>) -> Acknowledgment {
        Acknowledgment {
            user_id: user.into(),
            role: "nurse".into(),
            timestamp: now,
            notes: None,
        }
    }

    #[test]
    fn severity_ladder_is_ordered_and_stops_at_immediate() {
        assert!(Severity::None < Severity::Moderate);
        assert!(Severity::Urgent < Severity::Immediate);
        assert_eq!(Severity::Moderate.next_tier(), Some(Severity::Elevated));
        assert_eq!(Severity::Elevated.next_tier(), Some(Severity::Urgent));
        assert_eq!(Severity::Urgent.next_tier(), Some(Severity::Immediate));
        assert_eq!(Severity::Immediate.next_tier(), None);
    }

    #[test]
    fn acknowledge_is_repeatable_until_resolved() {
        let now = Utc::now();
        let mut alert = sample_alert(Severity::Urgent, now);

        alert.acknowledge(ack("nurse-1", now)).unwrap();
        alert.acknowledge(ack("nurse-2", now)).unwrap();
        assert_eq!(alert.acknowledgments.len(), 2);
        assert_eq!(alert.status, AlertStatus::Acknowledged);

        alert
            .resolve(Resolution {
                resolved_by: "nurse-1".into(),
                resolved_at: now,
                note: "safe".into(),
            })
            .unwrap();

        let err = alert.acknowledge(ack("nurse-3", now)).unwrap_err();
        assert!(matches!(err, CrisisError::InvalidState(_)));
        assert_eq!(alert.acknowledgments.len(), 2);
    }

    #[test]
    fn raise_severity_recomputes_deadline_from_now() {
        let created = Utc::now();
        let mut alert = sample_alert(Severity::Moderate, created);
        let later = created + Duration::hours(25);

        let escalation = alert
            .raise_severity(
                Severity::Elevated,
                StdDuration::from_secs(3600),
                "Response deadline exceeded",
                AUTO_TRIGGER,
                later,
            )
            .unwrap();

        assert_eq!(escalation.from_severity, Severity::Moderate);
        assert_eq!(alert.severity, Severity::Elevated);
        assert_eq!(alert.response_deadline, later + Duration::hours(1));
        assert_eq!(alert.status, AlertStatus::Active);

        let err = alert
            .raise_severity(Severity::Moderate, StdDuration::from_secs(1), "x", AUTO_TRIGGER, later)
            .unwrap_err();
        assert!(matches!(err, CrisisError::InvalidState(_)));
    }

    #[test]
    fn emergency_protocol_requires_unanswered_alert() {
        let now = Utc::now();
        let mut alert = sample_alert(Severity::Immediate, now);
        let escalation = alert
            .invoke_emergency_protocol("No acknowledgment within deadline", now)
            .unwrap();
        assert_eq!(escalation.action, EscalationAction::EmergencyProtocol);
        assert_eq!(escalation.to_severity, Severity::Immediate);
        assert_eq!(alert.status, AlertStatus::Escalated);

        let mut acked = sample_alert(Severity::Immediate, now);
        acked.acknowledge(ack("nurse-1", now)).unwrap();
        assert!(acked.invoke_emergency_protocol("late", now).is_err());
        assert!(acked.escalations.is_empty());
    }

    #[test]
    fn overdue_requires_active_status_and_no_acknowledgments() {
        let now = Utc::now();
        let mut alert = sample_alert(Severity::Urgent, now);
        let later = now + Duration::minutes(1);
        assert!(alert.is_overdue(later));
        assert!(!alert.is_overdue(now));

        alert.acknowledge(ack("nurse-1", now)).unwrap();
        assert!(!alert.is_overdue(later));
    }
}
