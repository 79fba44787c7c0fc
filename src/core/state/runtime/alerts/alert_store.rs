use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::core::persistence::alerts::crisis_alert_entity::{deadline_from, CrisisAlert};
use crate::core::persistence::alerts::crisis_alert_repository_trait::CrisisAlertRepositoryTrait;
use crate::errors::CrisisError;

/// Durable alert records plus the in-memory index of open alerts.
///
/// - every mutation of one alert runs under that alert's own async lock
/// - the durable write happens first, then the index is updated, with no
///   await in between, so a cancelled caller cannot leave them apart
/// - alerts are never locked together; there is no store-wide lock
pub struct AlertStore {
    repo: Arc<dyn CrisisAlertRepositoryTrait>,
    open: DashMap<String, CrisisAlert>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    retention: Duration,
}

impl AlertStore {
    pub fn new(repo: Arc<dyn CrisisAlertRepositoryTrait>, retention: Duration) -> Self {
        Self {
            repo,
            open: DashMap::new(),
            locks: DashMap::new(),
            retention,
        }
    }

    /// Retention is measured from creation, whatever happens to the alert later.
    pub fn expires_at(&self, alert: &CrisisAlert) -> DateTime<Utc> {
        deadline_from(alert.created_at, self.retention)
    }

    fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        self.locks.entry(id.to_string()).or_default().clone()
    }

    fn reindex(&self, alert: &CrisisAlert) {
        if alert.is_open() {
            self.open.insert(alert.id.clone(), alert.clone());
        } else {
            self.open.remove(&alert.id);
        }
    }

    fn load(&self, id: &str, now: DateTime<Utc>) -> Result<CrisisAlert, CrisisError> {
        if let Some(alert) = self.open.get(id) {
            return Ok(alert.clone());
        }

        self.repo
            .get(id, now)
            .map_err(CrisisError::persistence)?
            .ok_or_else(|| CrisisError::NotFound(id.to_string()))
    }

    /// Stores a new alert. The index entry is kept even when the durable
    /// write fails so escalation tracking still covers the alert; the error
    /// is returned for the caller to report.
    pub async fn create(&self, alert: &CrisisAlert) -> Result<(), CrisisError> {
        let lock = self.lock_for(&alert.id);
        let _guard = lock.lock().await;

        self.reindex(alert);
        self.repo
            .put(alert, self.expires_at(alert))
            .map_err(CrisisError::persistence)
    }

    /// Atomic check-and-transition on one alert.
    ///
    /// `transition` sees the current record under the alert's lock. Returning
    /// an error leaves the alert untouched; returning `Ok` persists the
    /// mutated record and refreshes the index.
    pub async fn update<T, F>(&self, id: &str, transition: F) -> Result<(CrisisAlert, T), CrisisError>
    where
        F: FnOnce(&mut CrisisAlert) -> Result<T, CrisisError>,
    {
        let lock = self.lock_for(id);
        let guard = lock.lock().await;

        let mut alert = match self.load(id, Utc::now()) {
            Ok(alert) => alert,
            Err(e @ CrisisError::NotFound(_)) => {
                drop(guard);
                self.locks.remove(id);
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        let outcome = transition(&mut alert)?;

        self.repo
            .put(&alert, self.expires_at(&alert))
            .map_err(CrisisError::persistence)?;
        self.reindex(&alert);

        Ok((alert, outcome))
    }

    pub fn get(&self, id: &str) -> Result<CrisisAlert, CrisisError> {
        self.load(id, Utc::now())
    }

    /// Snapshot of every open alert. Cost is proportional to the open count.
    pub fn list_open(&self) -> Vec<CrisisAlert> {
        self.open.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Reload the open index from durable storage. Returns the number of
    /// open alerts now tracked.
    pub fn rebuild_open_index(&self, now: DateTime<Utc>) -> Result<usize> {
        for alert in self.repo.list(now)? {
            if alert.is_open() {
                self.open.entry(alert.id.clone()).or_insert(alert);
            }
        }
        Ok(self.open.len())
    }

    /// Drop records past retention from durable storage and from memory.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let mut purged = self.repo.purge_expired(now)?;

        for id in &purged {
            self.open.remove(id);
            self.locks.remove(id);
        }

        // Alerts whose durable write never succeeded only live in the index.
        let stale: Vec<String> = self
            .open
            .iter()
            .filter(|entry| self.expires_at(entry.value()) <= now)
            .map(|entry| entry.key().clone())
            .collect();
        for id in stale {
            self.open.remove(&id);
            self.locks.remove(&id);
            purged.push(id);
        }

        Ok(purged)
    }
}
