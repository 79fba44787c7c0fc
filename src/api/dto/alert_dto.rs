//! Alert API DTOs
use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

use crate::domain::crisis::feed::alert_feed::FeedFilter;
use crate::domain::crisis::model::detection::DetectionContext;
use crate::domain::crisis::service::crisis_service::ActiveAlertFilter;

/// A resident message to screen, plus whatever clinical context the caller has.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AnalyzeRequest {
    #[validate(length(min = 1, max = 10000))]
    pub message: String,
    #[validate(length(min = 1))]
    pub user_id: String,
    #[validate(length(min = 1))]
    pub session_id: String,
    pub facility_id: Option<String>,
    #[serde(default)]
    pub recent_messages: Vec<String>,
    /// PHQ-9 total, 0..=27.
    #[validate(range(max = 27))]
    pub phq9_score: Option<u32>,
    /// GAD-7 total, 0..=21.
    #[validate(range(max = 21))]
    pub gad7_score: Option<u32>,
    #[serde(default)]
    pub life_story_risks: Vec<String>,
    /// Latest screening results keyed by instrument, passed through as-is.
    #[serde(default)]
    pub recent_assessments: BTreeMap<String, Value>,
}

impl AnalyzeRequest {
    pub fn into_parts(self) -> (String, DetectionContext) {
        let context = DetectionContext {
            user_id: self.user_id,
            session_id: self.session_id,
            facility_id: self.facility_id.filter(|f| !f.is_empty()),
            recent_messages: self.recent_messages,
            phq9_score: self.phq9_score,
            gad7_score: self.gad7_score,
            life_story_risks: self.life_story_risks,
            recent_assessments: self.recent_assessments,
        };
        (self.message, context)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AcknowledgeRequest {
    #[validate(length(min = 1))]
    pub responder_id: String,
    #[validate(length(min = 1))]
    pub role: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InProgressRequest {
    #[validate(length(min = 1))]
    pub responder_id: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ResolveRequest {
    #[validate(length(min = 1))]
    pub responder_id: String,
    #[validate(length(min = 1))]
    pub resolution: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListAlertsQuery {
    pub facility_id: Option<String>,
    pub user_id: Option<String>,
}

impl From<ListAlertsQuery> for ActiveAlertFilter {
    fn from(q: ListAlertsQuery) -> Self {
        ActiveAlertFilter {
            facility_id: q.facility_id,
            user_id: q.user_id,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamQuery {
    pub facility_id: Option<String>,
    pub user_id: Option<String>,
    pub role: Option<String>,
}

impl From<StreamQuery> for FeedFilter {
    fn from(q: StreamQuery) -> Self {
        FeedFilter {
            facility_id: q.facility_id,
            user_id: q.user_id,
            role: q.role,
        }
    }
}
