use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_with::{serde_as, DurationSeconds};

use crate::core::persistence::alerts::crisis_alert_entity::Severity;

/// One duration per persisted severity tier.
#[serde_as]
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SeverityDurations {
    #[serde_as(as = "DurationSeconds<u64>")]
    pub immediate: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub urgent: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub elevated: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub moderate: Duration,
}

impl SeverityDurations {
    /// `None` for [`Severity::None`], which never becomes an alert.
    pub fn for_severity(&self, severity: Severity) -> Option<Duration> {
        match severity {
            Severity::Immediate => Some(self.immediate),
            Severity::Urgent => Some(self.urgent),
            Severity::Elevated => Some(self.elevated),
            Severity::Moderate => Some(self.moderate),
            Severity::None => None,
        }
    }

    fn iter(&self) -> [(Severity, Duration); 4] {
        [
            (Severity::Immediate, self.immediate),
            (Severity::Urgent, self.urgent),
            (Severity::Elevated, self.elevated),
            (Severity::Moderate, self.moderate),
        ]
    }
}

/// Process-wide crisis engine settings. Loaded once at startup.
#[serde_as]
#[derive(Debug, Clone, Serialize)]
pub struct CrisisConfig {
    pub response_timeouts: SeverityDurations,
    /// How long to wait before checking for emergency auto-escalation.
    pub escalation_delays: SeverityDurations,
    pub max_retries: u32,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub retry_delay: Duration,
    pub enable_emergency_auto_call: bool,
    pub emergency_number: String,
    /// Merge facility on-call staff into IMMEDIATE recipient lists.
    pub page_on_call_staff: bool,

    #[serde_as(as = "DurationSeconds<u64>")]
    pub monitor_interval: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub response_initiation_timeout: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub classifier_timeout: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub notification_timeout: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub alert_retention: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub retention_sweep_interval: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub shutdown_grace: Duration,
    pub feed_capacity: usize,
}

impl Default for CrisisConfig {
    fn default() -> Self {
        Self {
            response_timeouts: SeverityDurations {
                immediate: Duration::from_secs(30),
                urgent: Duration::from_secs(5 * 60),
                elevated: Duration::from_secs(60 * 60),
                moderate: Duration::from_secs(24 * 60 * 60),
            },
            escalation_delays: SeverityDurations {
                immediate: Duration::from_secs(15),
                urgent: Duration::from_secs(2 * 60),
                elevated: Duration::from_secs(30 * 60),
                moderate: Duration::from_secs(12 * 60 * 60),
            },
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            enable_emergency_auto_call: true,
            emergency_number: "911".into(),
            page_on_call_staff: false,
            monitor_interval: Duration::from_secs(10),
            response_initiation_timeout: Duration::from_secs(5 * 60),
            classifier_timeout: Duration::from_secs(30),
            notification_timeout: Duration::from_secs(10),
            alert_retention: Duration::from_secs(7 * 24 * 60 * 60),
            retention_sweep_interval: Duration::from_secs(60 * 60),
            shutdown_grace: Duration::from_secs(10),
            feed_capacity: 1024,
        }
    }
}

impl CrisisConfig {
    /// Defaults overridden by `CRISIS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        override_secs("CRISIS_TIMEOUT_IMMEDIATE_SECS", &mut cfg.response_timeouts.immediate)?;
        override_secs("CRISIS_TIMEOUT_URGENT_SECS", &mut cfg.response_timeouts.urgent)?;
        override_secs("CRISIS_TIMEOUT_ELEVATED_SECS", &mut cfg.response_timeouts.elevated)?;
        override_secs("CRISIS_TIMEOUT_MODERATE_SECS", &mut cfg.response_timeouts.moderate)?;

        override_secs("CRISIS_ESCALATION_DELAY_IMMEDIATE_SECS", &mut cfg.escalation_delays.immediate)?;
        override_secs("CRISIS_ESCALATION_DELAY_URGENT_SECS", &mut cfg.escalation_delays.urgent)?;
        override_secs("CRISIS_ESCALATION_DELAY_ELEVATED_SECS", &mut cfg.escalation_delays.elevated)?;
        override_secs("CRISIS_ESCALATION_DELAY_MODERATE_SECS", &mut cfg.escalation_delays.moderate)?;

        override_parsed("CRISIS_MAX_RETRIES", &mut cfg.max_retries)?;
        override_secs("CRISIS_RETRY_DELAY_SECS", &mut cfg.retry_delay)?;
        override_parsed("CRISIS_ENABLE_EMERGENCY_AUTO_CALL", &mut cfg.enable_emergency_auto_call)?;
        override_parsed("CRISIS_EMERGENCY_NUMBER", &mut cfg.emergency_number)?;
        override_parsed("CRISIS_PAGE_ON_CALL_STAFF", &mut cfg.page_on_call_staff)?;

        override_secs("CRISIS_MONITOR_INTERVAL_SECS", &mut cfg.monitor_interval)?;
        override_secs("CRISIS_RESPONSE_INITIATION_TIMEOUT_SECS", &mut cfg.response_initiation_timeout)?;
        override_secs("CRISIS_CLASSIFIER_TIMEOUT_SECS", &mut cfg.classifier_timeout)?;
        override_secs("CRISIS_NOTIFICATION_TIMEOUT_SECS", &mut cfg.notification_timeout)?;
        override_secs("CRISIS_ALERT_RETENTION_SECS", &mut cfg.alert_retention)?;
        override_secs("CRISIS_RETENTION_SWEEP_INTERVAL_SECS", &mut cfg.retention_sweep_interval)?;
        override_secs("CRISIS_SHUTDOWN_GRACE_SECS", &mut cfg.shutdown_grace)?;
        override_parsed("CRISIS_FEED_CAPACITY", &mut cfg.feed_capacity)?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        for (severity, timeout) in self.response_timeouts.iter() {
            if timeout.is_zero() {
                bail!("response timeout for {} must be greater than zero", severity.as_code());
            }
        }
        for (severity, delay) in self.escalation_delays.iter() {
            if delay.is_zero() {
                bail!("escalation delay for {} must be greater than zero", severity.as_code());
            }
        }
        if self.monitor_interval.is_zero() || self.retention_sweep_interval.is_zero() {
            bail!("background task intervals must be greater than zero");
        }
        if self.alert_retention.is_zero() {
            bail!("alert retention must be greater than zero");
        }
        if self.feed_capacity == 0 {
            bail!("feed capacity must be greater than zero");
        }
        if self.enable_emergency_auto_call && self.emergency_number.trim().is_empty() {
            bail!("emergency number is required when emergency auto-call is enabled");
        }
        Ok(())
    }

    pub fn response_timeout(&self, severity: Severity) -> Option<Duration> {
        self.response_timeouts.for_severity(severity)
    }
}

fn override_secs(key: &str, target: &mut Duration) -> Result<()> {
    if let Ok(raw) = env::var(key) {
        let secs: u64 = raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a whole number of seconds, got {raw:?}"))?;
        *target = Duration::from_secs(secs);
    }
    Ok(())
}

fn override_parsed<T>(key: &str, target: &mut T) -> Result<()>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Ok(raw) = env::var(key) {
        *target = raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {key}: {raw:?}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_response_policy() {
        let cfg = CrisisConfig::default();
        assert_eq!(cfg.response_timeout(Severity::Immediate), Some(Duration::from_secs(30)));
        assert_eq!(cfg.response_timeout(Severity::Moderate), Some(Duration::from_secs(86_400)));
        assert_eq!(cfg.response_timeout(Severity::None), None);
        assert_eq!(cfg.escalation_delays.immediate, Duration::from_secs(15));
        assert_eq!(cfg.alert_retention, Duration::from_secs(7 * 86_400));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let mut cfg = CrisisConfig::default();
        cfg.response_timeouts.urgent = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn serializes_durations_as_seconds() {
        let json = serde_json::to_value(CrisisConfig::default()).unwrap();
        assert_eq!(json["response_timeouts"]["urgent"], 300);
        assert_eq!(json["monitor_interval"], 10);
    }
}
