//! Crisis alert lifecycle: detection, notification, escalation.

pub mod classifier;
pub mod feed;
pub mod model;
pub mod port;
pub mod service;
