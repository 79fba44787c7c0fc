pub mod crisis_service;
pub mod emergency_watcher;
pub mod escalation_service;
pub mod notification_coordinator;
pub mod recipients;
