//! HTTP adapters for the collaborator services.

pub mod http_care_team_directory;
pub mod http_crisis_classifier;
pub mod webhook_crisis_notifier;
