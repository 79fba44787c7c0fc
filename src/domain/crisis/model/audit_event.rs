use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

pub const EVENT_RESPONSE_INITIATED: &str = "response_initiated";
pub const EVENT_ACKNOWLEDGED: &str = "acknowledged";
pub const EVENT_IN_PROGRESS: &str = "in_progress";
pub const EVENT_RESOLVED: &str = "resolved";
pub const EVENT_ESCALATED: &str = "escalated";
pub const EVENT_EMERGENCY_CALL: &str = "emergency_call";

#[derive(Debug, Clone, Serialize)]
pub struct CrisisAuditEvent {
    pub timestamp: DateTime<Utc>,
    pub alert_id: String,
    pub user_id: String,
    pub event_type: String,
    pub actor: String,
    pub details: Value,
}
