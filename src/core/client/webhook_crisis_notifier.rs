use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::info;

use crate::core::persistence::alerts::crisis_alert_entity::{CrisisAlert, Severity};
use crate::domain::crisis::port::crisis_notifier::CrisisNotifier;

const GATEWAY_ATTEMPTS: usize = 2;

/// Delivers through a notification gateway exposing one JSON endpoint per
/// channel. Transport errors are returned at once; the caller's retry policy
/// covers those.
pub struct WebhookCrisisNotifier {
    client: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Serialize)]
struct PushPayload<'a> {
    user_ids: &'a [String],
    alert_id: &'a str,
    severity: Severity,
    title: String,
    body: String,
}

#[derive(Serialize)]
struct SmsPayload<'a> {
    to: &'a [String],
    message: &'a str,
}

#[derive(Serialize)]
struct EmailPayload<'a> {
    to: &'a [String],
    subject: &'a str,
    body: &'a str,
}

#[derive(Serialize)]
struct EmergencyCallPayload<'a> {
    phone_number: &'a str,
    alert_id: &'a str,
    user_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    facility_id: Option<&'a str>,
    severity: Severity,
}

impl WebhookCrisisNotifier {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn endpoint(&self, channel: &str) -> String {
        format!("{}/{}", self.base_url, channel)
    }

    /// Posts to one channel endpoint, re-posting on a non-2xx answer. Any
    /// 2xx counts as delivered.
    async fn post_with_retry<T: Serialize + Sync>(
        &self,
        channel: &str,
        payload: &T,
        attempts: usize,
    ) -> Result<()> {
        let url = self.endpoint(channel);
        let mut last_status: Option<StatusCode> = None;
        let mut last_body = String::new();

        for _ in 0..attempts {
            let mut req = self.client.post(&url).json(payload);
            if let Some(token) = &self.token {
                req = req.bearer_auth(token);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| anyhow!("Notification gateway request ({}) failed: {}", channel, e))?;

            let status = resp.status();
            if status.is_success() {
                return Ok(());
            }

            last_status = Some(status);
            last_body = resp.text().await.unwrap_or_default();
        }

        Err(anyhow!(
            "Notification gateway ({}) failed after retries (last status: {:?}): {}",
            channel,
            last_status,
            last_body
        ))
    }

    async fn post<T: Serialize + Sync>(&self, channel: &str, payload: &T) -> Result<()> {
        self.post_with_retry(channel, payload, GATEWAY_ATTEMPTS).await
    }
}

fn push_payload<'a>(user_ids: &'a [String], alert: &'a CrisisAlert) -> PushPayload<'a> {
    PushPayload {
        user_ids,
        alert_id: &alert.id,
        severity: alert.severity,
        title: format!("Crisis alert: {}", alert.severity.as_code()),
        body: format!("Resident {} needs attention. Alert ID: {}", alert.user_id, alert.id),
    }
}

#[async_trait]
impl CrisisNotifier for WebhookCrisisNotifier {
    async fn send_push(&self, user_ids: &[String], alert: &CrisisAlert) -> Result<()> {
        self.post("push", &push_payload(user_ids, alert)).await
    }

    async fn send_sms(&self, phone_numbers: &[String], message: &str) -> Result<()> {
        self.post(
            "sms",
            &SmsPayload {
                to: phone_numbers,
                message,
            },
        )
        .await
    }

    async fn send_email(&self, emails: &[String], subject: &str, body: &str) -> Result<()> {
        self.post(
            "email",
            &EmailPayload {
                to: emails,
                subject,
                body,
            },
        )
        .await
    }

    /// Posted once; the coordinator decides whether a failed call is redialled.
    async fn trigger_emergency_call(&self, phone_number: &str, alert: &CrisisAlert) -> Result<()> {
        self.post_with_retry(
            "emergency-call",
            &EmergencyCallPayload {
                phone_number,
                alert_id: &alert.id,
                user_id: &alert.user_id,
                facility_id: alert.facility_id.as_deref(),
                severity: alert.severity,
            },
            1,
        )
        .await
    }
}

/// Logs what would have been sent. Used when no gateway is configured.
#[derive(Default)]
pub struct DryRunCrisisNotifier;

#[async_trait]
impl CrisisNotifier for DryRunCrisisNotifier {
    async fn send_push(&self, user_ids: &[String], alert: &CrisisAlert) -> Result<()> {
        info!(channel = "push", ?user_ids, alert_id = %alert.id, "Dry-run notification");
        Ok(())
    }

    async fn send_sms(&self, phone_numbers: &[String], message: &str) -> Result<()> {
        info!(channel = "sms", ?phone_numbers, message, "Dry-run notification");
        Ok(())
    }

    async fn send_email(&self, emails: &[String], subject: &str, _body: &str) -> Result<()> {
        info!(channel = "email", ?emails, subject, "Dry-run notification");
        Ok(())
    }

    async fn trigger_emergency_call(&self, phone_number: &str, alert: &CrisisAlert) -> Result<()> {
        info!(channel = "emergency_call", phone_number, alert_id = %alert.id, "Dry-run notification");
        Ok(())
    }
}
