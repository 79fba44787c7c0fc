pub mod care_team;
pub mod detection;
pub mod audit_event;
