use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::config::crisis_config::CrisisConfig;
use crate::core::persistence::alerts::crisis_alert_entity::{
    deadline_from, Acknowledgment, AlertStatus, CrisisAlert, Resolution, Severity,
};
use crate::core::persistence::alerts::crisis_alert_repository_trait::CrisisAlertRepositoryTrait;
use crate::core::state::runtime::alerts::alert_store::AlertStore;
use crate::domain::crisis::feed::alert_feed::{AlertFeed, AlertUpdate, AlertUpdateKind, FeedFilter};
use crate::domain::crisis::model::audit_event::{
    CrisisAuditEvent, EVENT_ACKNOWLEDGED, EVENT_IN_PROGRESS, EVENT_RESOLVED, EVENT_RESPONSE_INITIATED,
};
use crate::domain::crisis::model::detection::{DetectionContext, DetectionResult};
use crate::domain::crisis::port::audit_logger::AuditLogger;
use crate::domain::crisis::port::care_team_directory::CareTeamDirectory;
use crate::domain::crisis::port::crisis_classifier::CrisisClassifier;
use crate::domain::crisis::port::crisis_notifier::CrisisNotifier;
use crate::domain::crisis::service::emergency_watcher;
use crate::domain::crisis::service::notification_coordinator::{DispatchReport, NotificationCoordinator};
use crate::domain::crisis::service::recipients::{determine_recipients, merge_on_call};
use crate::errors::CrisisError;
use crate::scheduler::task_supervisor::{wait_for_shutdown, TaskSupervisor};

/// External capabilities the engine is built from.
pub struct Collaborators {
    pub classifier: Arc<dyn CrisisClassifier>,
    pub fallback_classifier: Arc<dyn CrisisClassifier>,
    pub care_team: Arc<dyn CareTeamDirectory>,
    pub notifier: Arc<dyn CrisisNotifier>,
    pub audit: Arc<dyn AuditLogger>,
}

/// Open-alert filter for [`CrisisService::list_active_alerts`].
#[derive(Debug, Clone, Default)]
pub struct ActiveAlertFilter {
    pub facility_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub open_alerts: usize,
    pub open_by_severity: BTreeMap<&'static str, usize>,
    pub open_by_status: BTreeMap<&'static str, usize>,
    pub background_tasks: usize,
    pub feed_subscribers: usize,
    pub shutting_down: bool,
}

/// Alert lifecycle: detection, response initiation, responder transitions.
///
/// Cheap to clone; every clone shares the same store, feed and supervisor.
#[derive(Clone)]
pub struct CrisisService {
    pub(crate) config: Arc<CrisisConfig>,
    pub(crate) store: Arc<AlertStore>,
    classifier: Arc<dyn CrisisClassifier>,
    fallback_classifier: Arc<dyn CrisisClassifier>,
    pub(crate) care_team: Arc<dyn CareTeamDirectory>,
    pub(crate) notifications: NotificationCoordinator,
    audit: Arc<dyn AuditLogger>,
    pub(crate) feed: AlertFeed,
    pub(crate) supervisor: Arc<TaskSupervisor>,
}

impl CrisisService {
    pub fn new(
        config: CrisisConfig,
        repo: Arc<dyn CrisisAlertRepositoryTrait>,
        collaborators: Collaborators,
    ) -> Self {
        let store = AlertStore::new(repo, config.alert_retention);
        let notifications = NotificationCoordinator::new(collaborators.notifier, &config);
        let feed = AlertFeed::new(config.feed_capacity);

        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            classifier: collaborators.classifier,
            fallback_classifier: collaborators.fallback_classifier,
            care_team: collaborators.care_team,
            notifications,
            audit: collaborators.audit,
            feed,
            supervisor: Arc::new(TaskSupervisor::new()),
        }
    }

    pub fn config(&self) -> &CrisisConfig {
        &self.config
    }

    pub fn supervisor(&self) -> &Arc<TaskSupervisor> {
        &self.supervisor
    }

    // ---------------------------------------------------------------------
    // Detection
    // ---------------------------------------------------------------------

    /// Classifies `message` and opens an alert when it warrants one.
    ///
    /// Returns `Ok(None)` for NONE. Returns once the alert is stored;
    /// notification fan-out continues in the background.
    pub async fn analyze(
        &self,
        message: &str,
        context: DetectionContext,
    ) -> Result<Option<CrisisAlert>, CrisisError> {
        if message.trim().is_empty() {
            return Err(CrisisError::Validation("message must not be empty".into()));
        }

        let detection = self.detect(message, &context).await?;
        if detection.severity == Severity::None {
            debug!(user_id = %context.user_id, "No crisis indicators detected");
            return Ok(None);
        }

        let response_timeout = self.config.response_timeout(detection.severity).ok_or_else(|| {
            CrisisError::InvalidState(format!("no response timeout for {}", detection.severity.as_code()))
        })?;

        let now = Utc::now();
        let alert = CrisisAlert {
            id: Uuid::new_v4().to_string(),
            user_id: context.user_id.clone(),
            session_id: context.session_id.clone(),
            facility_id: context.facility_id.clone(),
            severity: detection.severity,
            confidence_score: detection.confidence,
            trigger_message: message.to_string(),
            detected_patterns: detection.patterns,
            reasoning: detection.reasoning,
            clinical_context: context.clinical_context(),
            created_at: now,
            response_deadline: deadline_from(now, response_timeout),
            status: AlertStatus::Active,
            assigned_to: Vec::new(),
            acknowledgments: Vec::new(),
            escalations: Vec::new(),
            resolution: None,
        };

        if let Err(e) = self.store.create(&alert).await {
            warn!(
                alert_id = %alert.id,
                error = %e,
                "Alert durable write failed; tracking it in memory only"
            );
        }

        info!(
            alert_id = %alert.id,
            user_id = %alert.user_id,
            severity = alert.severity.as_code(),
            confidence = alert.confidence_score,
            "Crisis alert created"
        );

        self.publish(AlertUpdateKind::Created, &alert, now);
        self.spawn_response_initiation(alert.clone());

        Ok(Some(alert))
    }

    async fn detect(
        &self,
        message: &str,
        context: &DetectionContext,
    ) -> Result<DetectionResult, CrisisError> {
        match self.classify(self.classifier.as_ref(), message, context).await {
            Ok(result) => return Ok(result),
            Err(e) => warn!(
                classifier = self.classifier.name(),
                error = %format!("{e:#}"),
                "Primary classifier failed; using fallback"
            ),
        }

        self.classify(self.fallback_classifier.as_ref(), message, context)
            .await
            .map_err(|e| CrisisError::DetectionFailure(format!("{e:#}")))
    }

    async fn classify(
        &self,
        classifier: &dyn CrisisClassifier,
        message: &str,
        context: &DetectionContext,
    ) -> anyhow::Result<DetectionResult> {
        timeout(self.config.classifier_timeout, classifier.analyze(message, context))
            .await
            .map_err(|_| {
                anyhow!(
                    "{} timed out after {:?}",
                    classifier.name(),
                    self.config.classifier_timeout
                )
            })?
    }

    // ---------------------------------------------------------------------
    // Response initiation
    // ---------------------------------------------------------------------

    /// Starts notification fan-out for the alert's current severity. The
    /// emergency watcher is scheduled up front so it runs even if every
    /// lookup below fails.
    pub(crate) fn spawn_response_initiation(&self, alert: CrisisAlert) {
        if alert.severity == Severity::Immediate {
            emergency_watcher::schedule(self, &alert);
        }

        let service = self.clone();
        let mut shutdown = self.supervisor.shutdown_signal();
        let spawned = self.supervisor.spawn(async move {
            let alert_id = alert.id.clone();
            let budget = service.config.response_initiation_timeout;

            tokio::select! {
                res = timeout(budget, service.initiate_response(alert)) => {
                    if res.is_err() {
                        warn!(%alert_id, ?budget, "Response initiation exceeded its time budget");
                    }
                }
                _ = wait_for_shutdown(&mut shutdown) => {
                    debug!(%alert_id, "Response initiation cancelled by shutdown");
                }
            }
        });

        if !spawned {
            warn!("Shutting down; response initiation not started");
        }
    }

    async fn initiate_response(&self, alert: CrisisAlert) {
        if matches!(alert.severity, Severity::Immediate | Severity::Urgent) {
            self.spawn_emergency_contact_outreach(alert.clone());
        }

        let team = match self.care_team.get_care_team(&alert.user_id).await {
            Ok(team) => Some(team),
            Err(e) => {
                error!(
                    alert_id = %alert.id,
                    user_id = %alert.user_id,
                    error = %format!("{e:#}"),
                    "Care team lookup failed; no staff will be notified"
                );
                None
            }
        };

        let mut recipients = team
            .as_ref()
            .map(|t| determine_recipients(alert.severity, t))
            .unwrap_or_default();

        if let Some(team) = &team {
            let facility = alert.facility_id.as_deref().or(team.facility_id.as_deref());
            if let (true, Severity::Immediate, Some(facility)) =
                (self.config.page_on_call_staff, alert.severity, facility)
            {
                match self.care_team.get_on_call_staff(facility, "").await {
                    Ok(staff) => merge_on_call(&mut recipients, &staff, alert.severity),
                    Err(e) => warn!(
                        alert_id = %alert.id,
                        facility_id = facility,
                        error = %format!("{e:#}"),
                        "On-call staff lookup failed"
                    ),
                }
            }
        }

        let alert_id = alert.id.clone();
        let assigned = recipients.user_ids.clone();
        let severity = alert.severity;
        let current = match self
            .store
            .update(&alert_id, move |a| {
                if !a.is_open() || a.severity != severity {
                    return Err(CrisisError::InvalidState(format!(
                        "alert {} is {} at {}",
                        a.id,
                        a.status.as_code(),
                        a.severity.as_code()
                    )));
                }
                a.assigned_to = assigned;
                Ok(())
            })
            .await
        {
            Ok((current, _)) => current,
            Err(CrisisError::InvalidState(reason)) => {
                debug!(%alert_id, reason, "Alert moved on; skipping stale fan-out");
                return;
            }
            Err(e) => {
                warn!(%alert_id, error = %e, "Could not record assignment");
                let mut fallback = alert;
                fallback.assigned_to = recipients.user_ids.clone();
                fallback
            }
        };

        let report = if recipients.is_empty() {
            warn!(
                alert_id = %current.id,
                severity = current.severity.as_code(),
                "No recipients for alert"
            );
            DispatchReport::default()
        } else {
            self.notifications.dispatch(&current, &recipients).await
        };

        info!(
            alert_id = %current.id,
            severity = current.severity.as_code(),
            recipients = recipients.user_ids.len(),
            delivered = report.delivered,
            failed = report.failed,
            "Response initiated"
        );

        self.audit(
            &current,
            EVENT_RESPONSE_INITIATED,
            "system",
            json!({
                "severity": current.severity,
                "recipients": recipients.user_ids,
                "delivered": report.delivered,
                "failed": report.failed,
            }),
        );
    }

    fn spawn_emergency_contact_outreach(&self, alert: CrisisAlert) {
        let service = self.clone();
        self.supervisor.spawn(async move {
            match service.care_team.get_emergency_contacts(&alert.user_id).await {
                Ok(contacts) if contacts.is_empty() => {
                    debug!(alert_id = %alert.id, "No emergency contacts on file");
                }
                Ok(contacts) => {
                    let report = service
                        .notifications
                        .notify_emergency_contacts(&alert, &contacts)
                        .await;
                    info!(
                        alert_id = %alert.id,
                        contacts = contacts.len(),
                        delivered = report.delivered,
                        failed = report.failed,
                        "Emergency contacts notified"
                    );
                }
                Err(e) => error!(
                    alert_id = %alert.id,
                    error = %format!("{e:#}"),
                    "Failed to get emergency contacts"
                ),
            }
        });
    }

    // ---------------------------------------------------------------------
    // Responder transitions
    // ---------------------------------------------------------------------

    pub async fn acknowledge(
        &self,
        alert_id: &str,
        responder_id: &str,
        role: &str,
        notes: Option<String>,
    ) -> Result<CrisisAlert, CrisisError> {
        require_responder(responder_id)?;

        let now = Utc::now();
        let ack = Acknowledgment {
            user_id: responder_id.to_string(),
            role: role.to_string(),
            timestamp: now,
            notes: notes.clone(),
        };
        let (alert, _) = self.store.update(alert_id, |a| a.acknowledge(ack)).await?;

        let response_time = elapsed_secs(alert.created_at, now);
        info!(
            alert_id,
            acknowledged_by = responder_id,
            response_time_secs = response_time,
            "Alert acknowledged"
        );

        self.audit(
            &alert,
            EVENT_ACKNOWLEDGED,
            responder_id,
            json!({
                "role": role,
                "notes": notes,
                "response_time_seconds": response_time,
            }),
        );
        self.publish(AlertUpdateKind::Acknowledged, &alert, now);

        Ok(alert)
    }

    pub async fn mark_in_progress(
        &self,
        alert_id: &str,
        responder_id: &str,
    ) -> Result<CrisisAlert, CrisisError> {
        require_responder(responder_id)?;

        let (alert, _) = self.store.update(alert_id, |a| a.mark_in_progress()).await?;
        info!(alert_id, responder = responder_id, "Alert in progress");

        self.audit(&alert, EVENT_IN_PROGRESS, responder_id, json!({}));
        self.publish(AlertUpdateKind::InProgress, &alert, Utc::now());

        Ok(alert)
    }

    pub async fn resolve(
        &self,
        alert_id: &str,
        responder_id: &str,
        resolution: &str,
    ) -> Result<CrisisAlert, CrisisError> {
        require_responder(responder_id)?;

        let now = Utc::now();
        let record = Resolution {
            resolved_by: responder_id.to_string(),
            resolved_at: now,
            note: resolution.to_string(),
        };
        let (alert, _) = self.store.update(alert_id, |a| a.resolve(record)).await?;

        let total_time = elapsed_secs(alert.created_at, now);
        info!(
            alert_id,
            resolved_by = responder_id,
            total_time_secs = total_time,
            "Alert resolved"
        );

        self.audit(
            &alert,
            EVENT_RESOLVED,
            responder_id,
            json!({
                "resolution": resolution,
                "total_time_seconds": total_time,
                "acknowledgment_count": alert.acknowledgments.len(),
            }),
        );
        self.publish(AlertUpdateKind::Resolved, &alert, now);

        Ok(alert)
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn get_alert(&self, alert_id: &str) -> Result<CrisisAlert, CrisisError> {
        self.store.get(alert_id)
    }

    /// Open alerts matching `filter`, newest first.
    pub fn list_active_alerts(&self, filter: &ActiveAlertFilter) -> Vec<CrisisAlert> {
        let mut alerts: Vec<CrisisAlert> = self
            .store
            .list_open()
            .into_iter()
            .filter(|a| match filter.facility_id.as_deref() {
                Some(facility) => a.facility_id.as_deref() == Some(facility),
                None => true,
            })
            .filter(|a| match filter.user_id.as_deref() {
                Some(user) => a.user_id == user,
                None => true,
            })
            .collect();

        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        alerts
    }

    pub fn subscribe(&self, filter: FeedFilter) -> impl Stream<Item = AlertUpdate> + Send + 'static {
        self.feed.stream(filter)
    }

    pub fn status(&self) -> EngineStatus {
        let open = self.store.list_open();
        let mut open_by_severity = BTreeMap::new();
        let mut open_by_status = BTreeMap::new();
        for alert in &open {
            *open_by_severity.entry(alert.severity.as_code()).or_insert(0) += 1;
            *open_by_status.entry(alert.status.as_code()).or_insert(0) += 1;
        }

        EngineStatus {
            open_alerts: open.len(),
            open_by_severity,
            open_by_status,
            background_tasks: self.supervisor.active_count(),
            feed_subscribers: self.feed.subscriber_count(),
            shutting_down: self.supervisor.is_shutting_down(),
        }
    }

    // ---------------------------------------------------------------------
    // Maintenance
    // ---------------------------------------------------------------------

    /// Reloads open alerts from durable storage and re-arms emergency
    /// watchers for unanswered IMMEDIATE alerts.
    pub fn rebuild_open_index(&self) -> anyhow::Result<usize> {
        let count = self.store.rebuild_open_index(Utc::now())?;

        for alert in self.store.list_open() {
            if alert.severity == Severity::Immediate && alert.is_unanswered() {
                emergency_watcher::schedule(self, &alert);
            }
        }

        info!(open_alerts = count, "Open alert index rebuilt");
        Ok(count)
    }

    pub fn purge_expired(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<String>> {
        self.store.purge_expired(now)
    }

    /// Stops accepting background work and drains what is running.
    pub async fn shutdown(&self) {
        let aborted = self.supervisor.shutdown(self.config.shutdown_grace).await;
        info!(aborted, "Crisis engine stopped");
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    pub(crate) fn publish(&self, kind: AlertUpdateKind, alert: &CrisisAlert, at: DateTime<Utc>) {
        self.feed.publish(AlertUpdate::new(kind, alert, at));
    }

    /// Fire-and-forget audit write.
    pub(crate) fn audit(&self, alert: &CrisisAlert, event_type: &str, actor: &str, details: Value) {
        let event = CrisisAuditEvent {
            timestamp: Utc::now(),
            alert_id: alert.id.clone(),
            user_id: alert.user_id.clone(),
            event_type: event_type.to_string(),
            actor: actor.to_string(),
            details,
        };

        let audit = self.audit.clone();
        let spawned = self.supervisor.spawn(async move {
            if let Err(e) = audit.log_event(&event).await {
                error!(
                    alert_id = %event.alert_id,
                    event_type = %event.event_type,
                    error = %format!("{e:#}"),
                    "Failed to write audit event"
                );
            }
        });

        if !spawned {
            warn!(alert_id = %alert.id, event_type, "Shutting down; audit event dropped");
        }
    }
}

fn require_responder(responder_id: &str) -> Result<(), CrisisError> {
    if responder_id.trim().is_empty() {
        return Err(CrisisError::Validation("responder_id must not be empty".into()));
    }
    Ok(())
}

fn elapsed_secs(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds().max(0) as f64 / 1000.0
}
