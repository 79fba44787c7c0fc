pub mod alert_store;
