//! Capabilities the engine consumes. Each is injected at construction so
//! tests can swap in doubles.

pub mod audit_logger;
pub mod care_team_directory;
pub mod crisis_classifier;
pub mod crisis_notifier;
