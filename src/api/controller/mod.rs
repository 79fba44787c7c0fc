//! Controllers: connect routes to domain operations

pub mod alert;
pub mod system;
