use anyhow::Result;
use async_trait::async_trait;

use crate::domain::crisis::model::audit_event::CrisisAuditEvent;

#[async_trait]
pub trait AuditLogger: Send + Sync {
    async fn log_event(&self, event: &CrisisAuditEvent) -> Result<()>;
}
