use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::domain::crisis::model::care_team::{CareTeam, EmergencyContact, TeamMember};
use crate::domain::crisis::port::care_team_directory::CareTeamDirectory;

/// Read-only client for the care-team service.
pub struct HttpCareTeamDirectory {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpCareTeamDirectory {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn care_team_url(&self, resident_id: &str) -> String {
        format!(
            "{}/residents/{}/care-team",
            self.base_url,
            urlencoding::encode(resident_id)
        )
    }

    fn emergency_contacts_url(&self, resident_id: &str) -> String {
        format!(
            "{}/residents/{}/emergency-contacts",
            self.base_url,
            urlencoding::encode(resident_id)
        )
    }

    fn on_call_url(&self, facility_id: &str, role: &str) -> String {
        let mut url = format!(
            "{}/facilities/{}/on-call",
            self.base_url,
            urlencoding::encode(facility_id)
        );
        if !role.is_empty() {
            url.push_str("?role=");
            url.push_str(&urlencoding::encode(role));
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut req = self.client.get(url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| anyhow!("Care team request to {} failed: {}", url, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Care team service returned {}: {}", status, text));
        }

        resp.json::<T>()
            .await
            .map_err(|e| anyhow!("Failed to parse care team response from {}: {}", url, e))
    }
}

#[async_trait]
impl CareTeamDirectory for HttpCareTeamDirectory {
    async fn get_care_team(&self, resident_id: &str) -> Result<CareTeam> {
        self.get_json(&self.care_team_url(resident_id)).await
    }

    async fn get_emergency_contacts(&self, resident_id: &str) -> Result<Vec<EmergencyContact>> {
        self.get_json(&self.emergency_contacts_url(resident_id)).await
    }

    async fn get_on_call_staff(&self, facility_id: &str, role: &str) -> Result<Vec<TeamMember>> {
        self.get_json(&self.on_call_url(facility_id, role)).await
    }
}

/// Stand-in when no care-team service is configured. Every lookup fails, so
/// alerts are still recorded and watched but nobody is paged.
pub struct UnconfiguredCareTeamDirectory;

#[async_trait]
impl CareTeamDirectory for UnconfiguredCareTeamDirectory {
    async fn get_care_team(&self, resident_id: &str) -> Result<CareTeam> {
        bail!("care team service not configured (resident {resident_id})")
    }

    async fn get_emergency_contacts(&self, resident_id: &str) -> Result<Vec<EmergencyContact>> {
        bail!("care team service not configured (resident {resident_id})")
    }

    async fn get_on_call_staff(&self, facility_id: &str, _role: &str) -> Result<Vec<TeamMember>> {
        bail!("care team service not configured (facility {facility_id})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> HttpCareTeamDirectory {
        HttpCareTeamDirectory::new("http://care.local/api/", None, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn urls_are_built_from_trimmed_base() {
        let dir = directory();
        assert_eq!(
            dir.care_team_url("resident-1"),
            "http://care.local/api/residents/resident-1/care-team"
        );
        assert_eq!(
            dir.emergency_contacts_url("resident-1"),
            "http://care.local/api/residents/resident-1/emergency-contacts"
        );
    }

    #[test]
    fn path_segments_and_role_are_encoded() {
        let dir = directory();
        assert_eq!(
            dir.care_team_url("a b/c"),
            "http://care.local/api/residents/a%20b%2Fc/care-team"
        );
        assert_eq!(
            dir.on_call_url("facility-1", "social worker"),
            "http://care.local/api/facilities/facility-1/on-call?role=social%20worker"
        );
        assert_eq!(
            dir.on_call_url("facility-1", ""),
            "http://care.local/api/facilities/facility-1/on-call"
        );
    }

    #[tokio::test]
    async fn unconfigured_directory_always_fails() {
        let dir = UnconfiguredCareTeamDirectory;
        assert!(dir.get_care_team("resident-1").await.is_err());
        assert!(dir.get_emergency_contacts("resident-1").await.is_err());
        assert!(dir.get_on_call_staff("facility-1", "").await.is_err());
    }
}
