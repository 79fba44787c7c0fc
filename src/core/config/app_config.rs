use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use super::crisis_config::CrisisConfig;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Fs,
    Memory,
}

/// Endpoints of the services this engine depends on. Each one is optional so
/// the engine still starts (in degraded mode) when a collaborator is missing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollaboratorConfig {
    pub classifier_url: Option<String>,
    pub care_team_url: Option<String>,
    pub notifier_url: Option<String>,
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub storage: StorageBackend,
    pub collaborators: CollaboratorConfig,
    pub crisis: CrisisConfig,
}

impl AppConfig {
    /// Reads the process environment. Call after `dotenvy::dotenv()`.
    pub fn from_env() -> Result<Self> {
        let bind_addr = env::var("CRISIS_BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse::<SocketAddr>()
            .context("CRISIS_BIND_ADDR must be a socket address like 0.0.0.0:8080")?;

        let data_dir = PathBuf::from(env::var("CRISIS_DATA_DIR").unwrap_or_else(|_| "./data".into()));
        let log_dir = env::var("CRISIS_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("logs"));

        let storage = match env::var("CRISIS_STORAGE")
            .unwrap_or_else(|_| "fs".into())
            .to_lowercase()
            .as_str()
        {
            "fs" => StorageBackend::Fs,
            "memory" => StorageBackend::Memory,
            other => bail!("CRISIS_STORAGE must be `fs` or `memory`, got {other:?}"),
        };

        let collaborators = CollaboratorConfig {
            classifier_url: non_empty_var("CRISIS_CLASSIFIER_URL"),
            care_team_url: non_empty_var("CRISIS_CARE_TEAM_URL"),
            notifier_url: non_empty_var("CRISIS_NOTIFIER_URL"),
            api_token: non_empty_var("CRISIS_API_TOKEN"),
        };

        let crisis = CrisisConfig::from_env().context("Invalid crisis engine configuration")?;

        Ok(Self {
            bind_addr,
            data_dir,
            log_dir,
            storage,
            collaborators,
            crisis,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
