use anyhow::Result;
use chrono::{DateTime, Utc};

use super::crisis_alert_entity::CrisisAlert;

/// Durable storage for alert records. Every record carries its own expiry;
/// expired records behave as if they were never written.
pub trait CrisisAlertRepositoryTrait: Send + Sync {
    /// Insert or overwrite the record for `alert.id`.
    fn put(&self, alert: &CrisisAlert, expires_at: DateTime<Utc>) -> Result<()>;

    fn get(&self, id: &str, now: DateTime<Utc>) -> Result<Option<CrisisAlert>>;

    /// All unexpired records.
    fn list(&self, now: DateTime<Utc>) -> Result<Vec<CrisisAlert>>;

    /// Delete expired records, returning their IDs.
    fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>>;
}
