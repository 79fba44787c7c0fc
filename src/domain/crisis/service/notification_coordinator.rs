use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;

use crate::core::config::crisis_config::CrisisConfig;
use crate::core::persistence::alerts::crisis_alert_entity::{CrisisAlert, Severity};
use crate::core::util::retry::{with_retry, RetryPolicy};
use crate::domain::crisis::model::care_team::{EmergencyContact, NotificationRecipients};
use crate::domain::crisis::port::crisis_notifier::CrisisNotifier;
use crate::errors::CrisisError;

const CONTACT_SMS: &str = "Important: A crisis alert has been raised for your loved one. \
The care team has been notified and is responding. Please contact the facility for more information.";
const CONTACT_EMAIL_SUBJECT: &str = "Crisis Alert Notification";
const CONTACT_EMAIL_BODY: &str =
    "A crisis alert has been raised. Please contact the facility for more information.";

/// Delivery outcome for one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

impl DispatchReport {
    fn record(&mut self, outcomes: Vec<bool>) {
        self.attempted += outcomes.len();
        self.delivered += outcomes.iter().filter(|ok| **ok).count();
        self.failed += outcomes.iter().filter(|ok| !**ok).count();
    }
}

fn notification_failure(label: &str, err: &anyhow::Error) -> CrisisError {
    CrisisError::Notification(format!("{label}: {err:#}"))
}

/// Sends notifications one recipient at a time, concurrently. A failure for
/// one recipient or channel never blocks the others.
#[derive(Clone)]
pub struct NotificationCoordinator {
    notifier: Arc<dyn CrisisNotifier>,
    policy: RetryPolicy,
    call_policy: RetryPolicy,
    immediate_timeout_secs: u64,
}

impl NotificationCoordinator {
    pub fn new(notifier: Arc<dyn CrisisNotifier>, config: &CrisisConfig) -> Self {
        let policy = RetryPolicy {
            max_retries: config.max_retries,
            delay: config.retry_delay,
            attempt_timeout: config.notification_timeout,
            retry_timeouts: true,
        };
        Self {
            notifier,
            policy,
            // A call that timed out may already be ringing.
            call_policy: RetryPolicy {
                retry_timeouts: false,
                ..policy
            },
            immediate_timeout_secs: config.response_timeouts.immediate.as_secs(),
        }
    }

    fn staff_sms(&self, alert: &CrisisAlert) -> String {
        format!(
            "CRISIS ALERT: Immediate attention required for resident. Level: {}. Please respond within {} seconds.",
            alert.severity.as_code(),
            self.immediate_timeout_secs
        )
    }

    async fn deliver<F, Fut>(&self, label: String, alert_id: &str, op: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        self.deliver_with(self.policy, label, alert_id, op).await
    }

    async fn deliver_with<F, Fut>(&self, policy: RetryPolicy, label: String, alert_id: &str, op: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        match with_retry(policy, &label, op).await {
            Ok(()) => true,
            Err(e) => {
                let err = notification_failure(&label, &e);
                tracing::error!(alert_id, error = %err, "Delivery failed");
                false
            }
        }
    }

    /// Push to every recipient; IMMEDIATE alerts also go out over SMS and email.
    pub async fn dispatch(&self, alert: &CrisisAlert, recipients: &NotificationRecipients) -> DispatchReport {
        let mut report = DispatchReport::default();

        let pushes = recipients.user_ids.iter().map(|user_id| {
            let target = vec![user_id.clone()];
            self.deliver(format!("push to {user_id}"), &alert.id, move || {
                let target = target.clone();
                async move { self.notifier.send_push(&target, alert).await }
            })
            .boxed()
        });
        let mut calls: Vec<_> = pushes.collect();

        if alert.severity == Severity::Immediate {
            let message = self.staff_sms(alert);
            for phone in &recipients.phone_numbers {
                let target = vec![phone.clone()];
                let message = message.clone();
                calls.push(
                    self.deliver(format!("sms to {phone}"), &alert.id, move || {
                        let target = target.clone();
                        let message = message.clone();
                        async move { self.notifier.send_sms(&target, &message).await }
                    })
                    .boxed(),
                );
            }

            let subject = format!("CRISIS ALERT ({})", alert.severity.as_code());
            let body = format!(
                "A crisis alert ({}) was raised for resident {}. Alert ID: {}. Respond immediately.",
                alert.severity.as_code(),
                alert.user_id,
                alert.id
            );
            for email in &recipients.emails {
                let target = vec![email.clone()];
                let subject = subject.clone();
                let body = body.clone();
                calls.push(
                    self.deliver(format!("email to {email}"), &alert.id, move || {
                        let target = target.clone();
                        let subject = subject.clone();
                        let body = body.clone();
                        async move { self.notifier.send_email(&target, &subject, &body).await }
                    })
                    .boxed(),
                );
            }
        }

        report.record(join_all(calls).await);
        report
    }

    /// SMS and email to each emergency contact that has the channel.
    pub async fn notify_emergency_contacts(
        &self,
        alert: &CrisisAlert,
        contacts: &[EmergencyContact],
    ) -> DispatchReport {
        let mut calls = Vec::new();

        for contact in contacts {
            if let Some(phone) = contact.phone.as_deref().filter(|p| !p.is_empty()) {
                let target = vec![phone.to_string()];
                calls.push(
                    self.deliver(format!("contact sms to {phone}"), &alert.id, move || {
                        let target = target.clone();
                        async move { self.notifier.send_sms(&target, CONTACT_SMS).await }
                    })
                    .boxed(),
                );
            }
            if let Some(email) = contact.email.as_deref().filter(|e| !e.is_empty()) {
                let target = vec![email.to_string()];
                calls.push(
                    self.deliver(format!("contact email to {email}"), &alert.id, move || {
                        let target = target.clone();
                        async move {
                            self.notifier
                                .send_email(&target, CONTACT_EMAIL_SUBJECT, CONTACT_EMAIL_BODY)
                                .await
                        }
                    })
                    .boxed(),
                );
            }
        }

        let mut report = DispatchReport::default();
        report.record(join_all(calls).await);
        report
    }

    pub async fn place_emergency_call(&self, number: &str, alert: &CrisisAlert) -> bool {
        self.deliver_with(self.call_policy, format!("emergency call to {number}"), &alert.id, || {
            self.notifier.trigger_emergency_call(number, alert)
        })
        .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::persistence::alerts::crisis_alert_entity::tests::sample_alert;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Sent {
        Push(String),
        Sms(String, String),
        Email(String, String),
        Call(String, String),
    }

    /// Records every delivery; targets listed in `failing` always error.
    #[derive(Default)]
    pub(crate) struct MockNotifier {
        pub sent: Mutex<Vec<Sent>>,
        pub attempts: Mutex<usize>,
        pub failing: Mutex<HashSet<String>>,
        /// Targets whose delivery never completes.
        pub hanging: Mutex<HashSet<String>>,
    }

    impl MockNotifier {
        pub(crate) fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        pub(crate) fn calls(&self) -> Vec<Sent> {
            self.sent()
                .into_iter()
                .filter(|s| matches!(s, Sent::Call(..)))
                .collect()
        }

        async fn attempt(&self, target: &str, sent: Sent) -> Result<()> {
            *self.attempts.lock().unwrap() += 1;
            let hangs = self.hanging.lock().unwrap().contains(target);
            if hangs {
                futures::future::pending::<()>().await;
            }
            if self.failing.lock().unwrap().contains(target) {
                return Err(anyhow!("gateway rejected {target}"));
            }
            self.sent.lock().unwrap().push(sent);
            Ok(())
        }
    }

    #[async_trait]
    impl CrisisNotifier for MockNotifier {
        async fn send_push(&self, user_ids: &[String], _alert: &CrisisAlert) -> Result<()> {
            let id = user_ids.join(",");
            self.attempt(&id, Sent::Push(id.clone()))
                .await
        }

        async fn send_sms(&self, phone_numbers: &[String], message: &str) -> Result<()> {
            let phone = phone_numbers.join(",");
            self.attempt(&phone, Sent::Sms(phone.clone(), message.to_string()))
                .await
        }

        async fn send_email(&self, emails: &[String], subject: &str, _body: &str) -> Result<()> {
            let email = emails.join(",");
            self.attempt(&email, Sent::Email(email.clone(), subject.to_string()))
                .await
        }

        async fn trigger_emergency_call(&self, phone_number: &str, alert: &CrisisAlert) -> Result<()> {
            self.attempt(phone_number, Sent::Call(phone_number.to_string(), alert.id.clone()))
                .await
        }
    }

    fn coordinator(notifier: Arc<MockNotifier>) -> NotificationCoordinator {
        NotificationCoordinator::new(notifier, &CrisisConfig::default())
    }

    fn recipients() -> NotificationRecipients {
        NotificationRecipients {
            user_ids: vec!["doc".into(), "rn".into()],
            phone_numbers: vec!["+1555doc".into()],
            emails: vec!["doc@facility.test".into()],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_uses_every_channel() {
        let notifier = Arc::new(MockNotifier::default());
        let alert = sample_alert(Severity::Immediate, Utc::now());

        let report = coordinator(notifier.clone()).dispatch(&alert, &recipients()).await;

        assert_eq!(report, DispatchReport { attempted: 4, delivered: 4, failed: 0 });
        let sent = notifier.sent();
        assert!(sent.contains(&Sent::Push("doc".into())));
        assert!(sent.iter().any(|s| matches!(s, Sent::Sms(p, m) if p == "+1555doc" && m.contains("30 seconds"))));
        assert!(sent.iter().any(|s| matches!(s, Sent::Email(e, _) if e == "doc@facility.test")));
    }

    #[tokio::test(start_paused = true)]
    async fn lower_tiers_only_push() {
        let notifier = Arc::new(MockNotifier::default());
        let alert = sample_alert(Severity::Urgent, Utc::now());

        let report = coordinator(notifier.clone()).dispatch(&alert, &recipients()).await;

        assert_eq!(report.attempted, 2);
        assert!(notifier.sent().iter().all(|s| matches!(s, Sent::Push(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn one_failing_recipient_does_not_block_the_rest() {
        let notifier = Arc::new(MockNotifier::default());
        notifier.failing.lock().unwrap().insert("doc".into());
        let alert = sample_alert(Severity::Elevated, Utc::now());

        let started = tokio::time::Instant::now();
        let report = coordinator(notifier.clone()).dispatch(&alert, &recipients()).await;

        assert_eq!(report, DispatchReport { attempted: 2, delivered: 1, failed: 1 });
        assert_eq!(notifier.sent(), vec![Sent::Push("rn".into())]);
        // 1 + max_retries attempts for the failing target, 1 for the other.
        assert_eq!(*notifier.attempts.lock().unwrap(), 5);
        assert!(started.elapsed() >= Duration::from_secs(15));
    }

    #[test]
    fn delivery_failures_carry_the_channel_and_cause() {
        let err = notification_failure("sms to +1555", &anyhow!("gateway down"));
        assert!(matches!(err, CrisisError::Notification(_)));
        assert_eq!(err.to_string(), "Notification failure: sms to +1555: gateway down");
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_emergency_call_is_not_redialled() {
        let notifier = Arc::new(MockNotifier::default());
        notifier.hanging.lock().unwrap().insert("911".into());
        let alert = sample_alert(Severity::Immediate, Utc::now());

        let placed = coordinator(notifier.clone()).place_emergency_call("911", &alert).await;

        assert!(!placed);
        assert_eq!(*notifier.attempts.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_emergency_call_is_retried() {
        let notifier = Arc::new(MockNotifier::default());
        notifier.failing.lock().unwrap().insert("911".into());
        let alert = sample_alert(Severity::Immediate, Utc::now());

        let placed = coordinator(notifier.clone()).place_emergency_call("911", &alert).await;

        assert!(!placed);
        assert_eq!(*notifier.attempts.lock().unwrap(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn emergency_contacts_get_sms_and_email() {
        let notifier = Arc::new(MockNotifier::default());
        let alert = sample_alert(Severity::Urgent, Utc::now());
        let contacts = vec![
            EmergencyContact {
                name: "Dana".into(),
                relationship: "daughter".into(),
                phone: Some("+1555dana".into()),
                email: Some("dana@family.test".into()),
                priority: 1,
                is_legal_proxy: true,
            },
            EmergencyContact {
                name: "Lee".into(),
                phone: None,
                email: Some("lee@family.test".into()),
                ..Default::default()
            },
        ];

        let report = coordinator(notifier.clone())
            .notify_emergency_contacts(&alert, &contacts)
            .await;

        assert_eq!(report.delivered, 3);
        assert!(notifier
            .sent()
            .contains(&Sent::Email("lee@family.test".into(), CONTACT_EMAIL_SUBJECT.into())));
    }
}
