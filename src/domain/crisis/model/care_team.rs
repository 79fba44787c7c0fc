use serde::{Deserialize, Serialize};

pub const ROLE_PHYSICIAN: &str = "physician";
pub const ROLE_NURSE: &str = "nurse";
pub const ROLE_SOCIAL_WORKER: &str = "social_worker";
pub const ROLE_CARE_MANAGER: &str = "care_manager";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CareTeam {
    pub resident_id: String,
    #[serde(default)]
    pub facility_id: Option<String>,
    #[serde(default)]
    pub members: Vec<TeamMember>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TeamMember {
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_on_call: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EmergencyContact {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub relationship: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub is_legal_proxy: bool,
}

/// Who gets notified for one alert, split by channel.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct NotificationRecipients {
    pub user_ids: Vec<String>,
    pub phone_numbers: Vec<String>,
    pub emails: Vec<String>,
}

impl NotificationRecipients {
    pub fn is_empty(&self) -> bool {
        self.user_ids.is_empty() && self.phone_numbers.is_empty() && self.emails.is_empty()
    }
}
