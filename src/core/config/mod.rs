pub mod app_config;
pub mod crisis_config;
