pub mod crisis_alert_entity;
pub mod crisis_alert_fs_adapter;
pub mod crisis_alert_memory_adapter;
pub mod crisis_alert_repository_trait;
