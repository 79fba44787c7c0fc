use anyhow::Result;
use async_trait::async_trait;

use crate::core::persistence::alerts::crisis_alert_entity::CrisisAlert;

/// Outbound delivery. Every call stands alone: a failure on one channel says
/// nothing about the others.
#[async_trait]
pub trait CrisisNotifier: Send + Sync {
    async fn send_push(&self, user_ids: &[String], alert: &CrisisAlert) -> Result<()>;

    async fn send_sms(&self, phone_numbers: &[String], message: &str) -> Result<()>;

    async fn send_email(&self, emails: &[String], subject: &str, body: &str) -> Result<()>;

    async fn trigger_emergency_call(&self, phone_number: &str, alert: &CrisisAlert) -> Result<()>;
}
