use std::{
    fs::{self, OpenOptions},
    io::{BufWriter, Write},
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;

use crate::core::persistence::storage_path::audit_day_file_path;
use crate::domain::crisis::model::audit_event::CrisisAuditEvent;
use crate::domain::crisis::port::audit_logger::AuditLogger;

/// Append-only audit trail, one JSON line per event, one file per UTC day
/// under `<data_dir>/audit/`. Every event is also emitted on the `audit`
/// tracing target.
#[derive(Debug, Clone)]
pub struct FsAuditLogger {
    data_dir: PathBuf,
    // Serializes appends so concurrent lines never interleave.
    write_lock: Arc<Mutex<()>>,
}

impl FsAuditLogger {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    fn append(&self, event: &CrisisAuditEvent) -> Result<()> {
        let path = audit_day_file_path(&self.data_dir, event.timestamp.date_naive());
        let mut line = serde_json::to_string(event).context("Failed to serialize audit event")?;
        line.push('\n');

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("audit write lock poisoned"))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create audit directory")?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open audit file {:?}", path))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(line.as_bytes())?;
        writer.flush()?;

        Ok(())
    }
}

#[async_trait]
impl AuditLogger for FsAuditLogger {
    async fn log_event(&self, event: &CrisisAuditEvent) -> Result<()> {
        tracing::info!(
            target: "audit",
            alert_id = %event.alert_id,
            user_id = %event.user_id,
            event_type = %event.event_type,
            actor = %event.actor,
            details = %event.details,
            "Crisis audit event"
        );

        let logger = self.clone();
        let event = event.clone();
        tokio::task::spawn_blocking(move || logger.append(&event))
            .await
            .map_err(|e| anyhow!("Audit write task failed: {}", e))?
    }
}
