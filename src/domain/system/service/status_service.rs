use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::core::config::app_config::AppConfig;
use crate::domain::crisis::service::crisis_service::CrisisService;

pub async fn status(service: &CrisisService, started_at: DateTime<Utc>) -> Result<Value> {
    let engine = serde_json::to_value(service.status()).context("Failed to encode engine status")?;
    let uptime = (Utc::now() - started_at).num_seconds().max(0);

    Ok(json!({
        "started_at": started_at,
        "uptime_seconds": uptime,
        "engine": engine,
    }))
}

pub async fn health(service: &CrisisService) -> Result<Value> {
    let state = if service.supervisor().is_shutting_down() {
        "shutting_down"
    } else {
        "ok"
    };
    Ok(json!({ "status": state }))
}

/// Effective configuration. Secrets are never serialized.
pub async fn config(config: &AppConfig) -> Result<Value> {
    serde_json::to_value(config).context("Failed to encode configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::app_config::{CollaboratorConfig, StorageBackend};
    use crate::core::config::crisis_config::CrisisConfig;
    use crate::core::persistence::alerts::crisis_alert_entity::Severity;
    use crate::domain::crisis::service::crisis_service::tests::{context, harness};

    #[tokio::test(start_paused = true)]
    async fn status_counts_open_alerts() {
        let h = harness(Severity::Urgent);
        h.service.analyze("I want to die", context()).await.unwrap();

        let value = status(&h.service, Utc::now()).await.unwrap();

        assert_eq!(value["engine"]["open_alerts"], 1);
        assert_eq!(value["engine"]["open_by_severity"]["URGENT"], 1);
        assert_eq!(value["engine"]["shutting_down"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn health_reports_shutdown() {
        let h = harness(Severity::Urgent);
        assert_eq!(health(&h.service).await.unwrap()["status"], "ok");

        h.service.shutdown().await;
        assert_eq!(health(&h.service).await.unwrap()["status"], "shutting_down");
    }

    #[tokio::test]
    async fn config_hides_api_token() {
        let app = AppConfig {
            bind_addr: "127.0.0.1:8080".parse().unwrap(),
            data_dir: "./data".into(),
            log_dir: "./data/logs".into(),
            storage: StorageBackend::Memory,
            collaborators: CollaboratorConfig {
                api_token: Some("secret".into()),
                ..Default::default()
            },
            crisis: CrisisConfig::default(),
        };

        let value = config(&app).await.unwrap();

        assert_eq!(value["storage"], "memory");
        assert_eq!(value["crisis"]["response_timeouts"]["immediate"], 30);
        assert!(value["collaborators"].get("api_token").is_none());
    }
}
