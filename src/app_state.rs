use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::core::client::http_care_team_directory::{HttpCareTeamDirectory, UnconfiguredCareTeamDirectory};
use crate::core::client::http_crisis_classifier::HttpCrisisClassifier;
use crate::core::client::webhook_crisis_notifier::{DryRunCrisisNotifier, WebhookCrisisNotifier};
use crate::core::config::app_config::{AppConfig, StorageBackend};
use crate::core::persistence::alerts::crisis_alert_fs_adapter::CrisisAlertFsAdapter;
use crate::core::persistence::alerts::crisis_alert_memory_adapter::CrisisAlertMemoryAdapter;
use crate::core::persistence::alerts::crisis_alert_repository_trait::CrisisAlertRepositoryTrait;
use crate::core::persistence::audit::fs_audit_logger::FsAuditLogger;
use crate::domain::crisis::classifier::keyword_classifier::KeywordCrisisClassifier;
use crate::domain::crisis::port::care_team_directory::CareTeamDirectory;
use crate::domain::crisis::port::crisis_classifier::CrisisClassifier;
use crate::domain::crisis::port::crisis_notifier::CrisisNotifier;
use crate::domain::crisis::service::crisis_service::{Collaborators, CrisisService};
use crate::domain::system::service::status_service;

/// Wires the engine from configuration. Missing collaborator URLs fall back
/// to local stand-ins so the engine still records and watches alerts.
pub fn build_crisis_service(config: &AppConfig) -> Result<CrisisService> {
    let repo: Arc<dyn CrisisAlertRepositoryTrait> = match config.storage {
        StorageBackend::Fs => Arc::new(CrisisAlertFsAdapter::new(config.data_dir.clone())),
        StorageBackend::Memory => {
            warn!("In-memory alert storage: alerts will not survive a restart");
            Arc::new(CrisisAlertMemoryAdapter::new())
        }
    };

    let collab = &config.collaborators;
    let token = collab.api_token.clone();
    let crisis = &config.crisis;

    let fallback_classifier: Arc<dyn CrisisClassifier> = Arc::new(KeywordCrisisClassifier::default());
    let classifier: Arc<dyn CrisisClassifier> = match &collab.classifier_url {
        Some(url) => Arc::new(HttpCrisisClassifier::new(url.clone(), token.clone(), crisis.classifier_timeout)?),
        None => {
            warn!("CRISIS_CLASSIFIER_URL not set; keyword classifier is primary");
            fallback_classifier.clone()
        }
    };

    let care_team: Arc<dyn CareTeamDirectory> = match &collab.care_team_url {
        Some(url) => Arc::new(HttpCareTeamDirectory::new(url.clone(), token.clone(), crisis.notification_timeout)?),
        None => {
            warn!("CRISIS_CARE_TEAM_URL not set; nobody will be paged");
            Arc::new(UnconfiguredCareTeamDirectory)
        }
    };

    let notifier: Arc<dyn CrisisNotifier> = match &collab.notifier_url {
        Some(url) => Arc::new(WebhookCrisisNotifier::new(url.clone(), token, crisis.notification_timeout)?),
        None => {
            warn!("CRISIS_NOTIFIER_URL not set; notifications are logged only");
            Arc::new(DryRunCrisisNotifier)
        }
    };

    info!(
        storage = ?config.storage,
        classifier = classifier.name(),
        "Crisis engine wired"
    );

    Ok(CrisisService::new(
        crisis.clone(),
        repo,
        Collaborators {
            classifier,
            fallback_classifier,
            care_team,
            notifier,
            audit: Arc::new(FsAuditLogger::new(config.data_dir.clone())),
        },
    ))
}

#[derive(Clone)]
pub struct AppState {
    pub crisis_service: CrisisService,
    pub system_service: Arc<SystemService>,
}

pub fn build_app_state(config: Arc<AppConfig>, crisis_service: CrisisService) -> AppState {
    AppState {
        system_service: Arc::new(SystemService {
            crisis_service: crisis_service.clone(),
            config,
            started_at: Utc::now(),
        }),
        crisis_service,
    }
}

pub struct SystemService {
    crisis_service: CrisisService,
    config: Arc<AppConfig>,
    started_at: DateTime<Utc>,
}

impl SystemService {
    pub async fn status(&self) -> anyhow::Result<serde_json::Value> {
        status_service::status(&self.crisis_service, self.started_at).await
    }

    pub async fn health(&self) -> anyhow::Result<serde_json::Value> {
        status_service::health(&self.crisis_service).await
    }

    pub async fn config(&self) -> anyhow::Result<serde_json::Value> {
        status_service::config(&self.config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::app_config::CollaboratorConfig;
    use crate::core::config::crisis_config::CrisisConfig;
    use crate::domain::crisis::model::detection::DetectionContext;

    fn config(dir: &std::path::Path) -> AppConfig {
        AppConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            data_dir: dir.to_path_buf(),
            log_dir: dir.join("logs"),
            storage: StorageBackend::Fs,
            collaborators: CollaboratorConfig::default(),
            crisis: CrisisConfig::default(),
        }
    }

    #[tokio::test]
    async fn unconfigured_collaborators_still_record_alerts() {
        let dir = tempfile::tempdir().unwrap();
        let service = build_crisis_service(&config(dir.path())).unwrap();

        let context = DetectionContext {
            user_id: "resident-1".into(),
            session_id: "session-1".into(),
            ..Default::default()
        };
        let alert = service
            .analyze("I want to end my life", context)
            .await
            .unwrap()
            .unwrap();

        assert!(dir.path().join("alerts").join(format!("{}.json", alert.id)).exists());
        service.shutdown().await;
    }
}
