use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

use super::crisis_alert_entity::CrisisAlert;
use super::crisis_alert_repository_trait::CrisisAlertRepositoryTrait;

/// Process-local alert storage. Honors expiry exactly like the FS adapter but
/// loses everything on restart; meant for local runs and tests.
#[derive(Debug, Default)]
pub struct CrisisAlertMemoryAdapter {
    records: RwLock<HashMap<String, (DateTime<Utc>, CrisisAlert)>>,
}

impl CrisisAlertMemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CrisisAlertRepositoryTrait for CrisisAlertMemoryAdapter {
    fn put(&self, alert: &CrisisAlert, expires_at: DateTime<Utc>) -> Result<()> {
        let mut guard = self
            .records
            .write()
            .map_err(|_| anyhow!("alert record lock poisoned"))?;
        guard.insert(alert.id.clone(), (expires_at, alert.clone()));
        Ok(())
    }

    fn get(&self, id: &str, now: DateTime<Utc>) -> Result<Option<CrisisAlert>> {
        let guard = self
            .records
            .read()
            .map_err(|_| anyhow!("alert record lock poisoned"))?;
        Ok(guard
            .get(id)
            .filter(|(expires_at, _)| *expires_at > now)
            .map(|(_, alert)| alert.clone()))
    }

    fn list(&self, now: DateTime<Utc>) -> Result<Vec<CrisisAlert>> {
        let guard = self
            .records
            .read()
            .map_err(|_| anyhow!("alert record lock poisoned"))?;
        Ok(guard
            .values()
            .filter(|(expires_at, _)| *expires_at > now)
            .map(|(_, alert)| alert.clone())
            .collect())
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let mut guard = self
            .records
            .write()
            .map_err(|_| anyhow!("alert record lock poisoned"))?;
        let expired: Vec<String> = guard
            .iter()
            .filter(|(_, (expires_at, _))| *expires_at <= now)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            guard.remove(id);
        }

        Ok(expired)
    }
}
