pub mod alert_feed;
