use std::{
    fs::{self, File},
    io::{BufReader, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::persistence::storage_path::{crisis_alert_dir, crisis_alert_path};

use super::crisis_alert_entity::CrisisAlert;
use super::crisis_alert_repository_trait::CrisisAlertRepositoryTrait;

/// On-disk envelope: the alert plus its retention deadline.
#[derive(Debug, Serialize, Deserialize)]
struct StoredCrisisAlert {
    expires_at: DateTime<Utc>,
    alert: CrisisAlert,
}

/// FS adapter for alert records.
///
/// One JSON document per alert under `<data_dir>/alerts/<id>.json`. Writes go
/// to a temp file that is synced and renamed over the target, so a reader
/// sees either the previous record or the new one, never a torn write.
#[derive(Debug, Clone)]
pub struct CrisisAlertFsAdapter {
    data_dir: PathBuf,
}

impl CrisisAlertFsAdapter {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn read_from_path(path: &Path) -> Result<StoredCrisisAlert> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open alert file {:?}", path))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse alert file {:?}", path))
    }

    fn write(&self, stored: &StoredCrisisAlert) -> Result<()> {
        let path = crisis_alert_path(&self.data_dir, &stored.alert.id);

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create alerts directory")?;
        }

        let tmp_path = path.with_extension("json.tmp");
        let mut f = File::create(&tmp_path).context("Failed to create temp alert file")?;
        serde_json::to_writer(&mut f, stored).context("Failed to serialize alert")?;
        f.flush()?;
        f.sync_all().context("Failed to sync temp alert file")?;

        fs::rename(&tmp_path, &path).context("Failed to finalize alert file")?;

        #[cfg(unix)]
        if let Some(dir) = path.parent() {
            let dir_file = File::open(dir).context("Failed to open alerts directory")?;
            dir_file.sync_all().context("Failed to sync alerts directory")?;
        }

        Ok(())
    }

    fn stored_entries(&self) -> Result<Vec<(PathBuf, StoredCrisisAlert)>> {
        let dir = crisis_alert_dir(&self.data_dir);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir).context("Failed to read alerts directory")? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            match Self::read_from_path(&path) {
                Ok(stored) => entries.push((path, stored)),
                Err(e) => tracing::warn!(error = ?e, "Skipping unreadable alert record"),
            }
        }

        Ok(entries)
    }
}

impl CrisisAlertRepositoryTrait for CrisisAlertFsAdapter {
    fn put(&self, alert: &CrisisAlert, expires_at: DateTime<Utc>) -> Result<()> {
        self.write(&StoredCrisisAlert {
            expires_at,
            alert: alert.clone(),
        })
    }

    fn get(&self, id: &str, now: DateTime<Utc>) -> Result<Option<CrisisAlert>> {
        let path = crisis_alert_path(&self.data_dir, id);
        if !path.exists() {
            return Ok(None);
        }

        let stored = Self::read_from_path(&path)?;
        if stored.expires_at <= now || stored.alert.id != id {
            return Ok(None);
        }

        Ok(Some(stored.alert))
    }

    fn list(&self, now: DateTime<Utc>) -> Result<Vec<CrisisAlert>> {
        Ok(self
            .stored_entries()?
            .into_iter()
            .filter(|(_, stored)| stored.expires_at > now)
            .map(|(_, stored)| stored.alert)
            .collect())
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let mut purged = Vec::new();

        for (path, stored) in self.stored_entries()? {
            if stored.expires_at > now {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(_) => {
                    tracing::info!(alert_id = %stored.alert.id, "Deleted expired alert record");
                    purged.push(stored.alert.id);
                }
                Err(e) => tracing::error!("Failed to delete {:?}: {}", path, e),
            }
        }

        Ok(purged)
    }
}
