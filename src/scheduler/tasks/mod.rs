pub mod escalation;
pub mod retention;
