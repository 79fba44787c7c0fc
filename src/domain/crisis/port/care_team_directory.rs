use anyhow::Result;
use async_trait::async_trait;

use crate::domain::crisis::model::care_team::{CareTeam, EmergencyContact, TeamMember};

#[async_trait]
pub trait CareTeamDirectory: Send + Sync {
    async fn get_care_team(&self, resident_id: &str) -> Result<CareTeam>;

    async fn get_emergency_contacts(&self, resident_id: &str) -> Result<Vec<EmergencyContact>>;

    /// On-call staff at a facility. An empty `role` means any role.
    async fn get_on_call_staff(&self, facility_id: &str, role: &str) -> Result<Vec<TeamMember>>;
}
