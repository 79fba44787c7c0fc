pub mod client;
pub mod config;
pub mod persistence;
pub mod state;
pub mod util;
