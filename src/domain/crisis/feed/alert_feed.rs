use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::core::persistence::alerts::crisis_alert_entity::{AlertStatus, CrisisAlert, Severity};
use crate::domain::crisis::service::recipients::role_receives;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertUpdateKind {
    Created,
    Escalated,
    EmergencyProtocol,
    Acknowledged,
    InProgress,
    Resolved,
}

/// One state change on one alert, as pushed to live subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct AlertUpdate {
    pub kind: AlertUpdateKind,
    pub alert_id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facility_id: Option<String>,
    pub severity: Severity,
    pub status: AlertStatus,
    pub timestamp: DateTime<Utc>,
    pub alert: CrisisAlert,
}

impl AlertUpdate {
    pub fn new(kind: AlertUpdateKind, alert: &CrisisAlert, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            alert_id: alert.id.clone(),
            user_id: alert.user_id.clone(),
            facility_id: alert.facility_id.clone(),
            severity: alert.severity,
            status: alert.status,
            timestamp,
            alert: alert.clone(),
        }
    }
}

/// What a subscriber wants to see. Empty fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedFilter {
    pub facility_id: Option<String>,
    pub user_id: Option<String>,
    /// Only alerts whose severity pages this responder role.
    pub role: Option<String>,
}

impl FeedFilter {
    pub fn matches(&self, update: &AlertUpdate) -> bool {
        if let Some(facility) = self.facility_id.as_deref() {
            if update.facility_id.as_deref() != Some(facility) {
                return false;
            }
        }
        if let Some(user) = self.user_id.as_deref() {
            if update.user_id != user {
                return false;
            }
        }
        if let Some(role) = self.role.as_deref() {
            if !role_receives(role, update.severity) {
                return false;
            }
        }
        true
    }
}

/// Fan-out of alert updates to live subscribers. Slow subscribers lose the
/// oldest updates instead of holding up the engine.
#[derive(Clone)]
pub struct AlertFeed {
    tx: broadcast::Sender<AlertUpdate>,
}

impl AlertFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, update: AlertUpdate) {
        // No receivers is the normal idle case.
        let _ = self.tx.send(update);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertUpdate> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Updates matching `filter`, from now on. Ends when the feed is dropped.
    pub fn stream(&self, filter: FeedFilter) -> impl Stream<Item = AlertUpdate> + Send + 'static {
        stream::unfold((self.subscribe(), filter), |(mut rx, filter)| async move {
            loop {
                match rx.recv().await {
                    Ok(update) if filter.matches(&update) => return Some((update, (rx, filter))),
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Feed subscriber lagged; oldest updates dropped");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::persistence::alerts::crisis_alert_entity::tests::sample_alert;

    #[tokio::test]
    async fn subscribers_receive_published_updates() {
        let feed = AlertFeed::new(8);
        let mut rx = feed.subscribe();
        let alert = sample_alert(Severity::Urgent, Utc::now());

        feed.publish(AlertUpdate::new(AlertUpdateKind::Created, &alert, Utc::now()));

        let update = rx.recv().await.unwrap();
        assert_eq!(update.kind, AlertUpdateKind::Created);
        assert_eq!(update.alert_id, "alert-1");
    }

    #[tokio::test]
    async fn stream_skips_updates_outside_the_filter() {
        use futures::StreamExt;

        let feed = AlertFeed::new(8);
        let stream = feed.stream(FeedFilter {
            user_id: Some("resident-2".into()),
            ..Default::default()
        });
        futures::pin_mut!(stream);

        let first = sample_alert(Severity::Urgent, Utc::now());
        let mut second = sample_alert(Severity::Urgent, Utc::now());
        second.id = "alert-2".into();
        second.user_id = "resident-2".into();

        feed.publish(AlertUpdate::new(AlertUpdateKind::Created, &first, Utc::now()));
        feed.publish(AlertUpdate::new(AlertUpdateKind::Created, &second, Utc::now()));

        let update = stream.next().await.unwrap();
        assert_eq!(update.alert_id, "alert-2");
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let feed = AlertFeed::new(8);
        let alert = sample_alert(Severity::Urgent, Utc::now());
        feed.publish(AlertUpdate::new(AlertUpdateKind::Created, &alert, Utc::now()));
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn filter_by_facility_user_and_role() {
        let alert = sample_alert(Severity::Moderate, Utc::now());
        let update = AlertUpdate::new(AlertUpdateKind::Created, &alert, Utc::now());

        assert!(FeedFilter::default().matches(&update));
        assert!(FeedFilter {
            facility_id: Some("facility-1".into()),
            ..Default::default()
        }
        .matches(&update));
        assert!(!FeedFilter {
            facility_id: Some("facility-2".into()),
            ..Default::default()
        }
        .matches(&update));
        assert!(!FeedFilter {
            user_id: Some("resident-9".into()),
            ..Default::default()
        }
        .matches(&update));
        assert!(FeedFilter {
            role: Some("care_manager".into()),
            ..Default::default()
        }
        .matches(&update));
        assert!(!FeedFilter {
            role: Some("physician".into()),
            ..Default::default()
        }
        .matches(&update));
    }
}
