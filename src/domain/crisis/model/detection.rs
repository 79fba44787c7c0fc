use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::persistence::alerts::crisis_alert_entity::Severity;

/// Everything the classifier may look at besides the message itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionContext {
    pub user_id: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility_id: Option<String>,
    #[serde(default)]
    pub recent_messages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phq9_score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gad7_score: Option<u32>,
    #[serde(default)]
    pub life_story_risks: Vec<String>,
    #[serde(default)]
    pub recent_assessments: BTreeMap<String, Value>,
}

impl DetectionContext {
    /// Clinical context copied onto the alert.
    pub fn clinical_context(&self) -> BTreeMap<String, Value> {
        let mut ctx = BTreeMap::new();
        if let Some(score) = self.phq9_score {
            ctx.insert("phq9_score".to_string(), Value::from(score));
        }
        if let Some(score) = self.gad7_score {
            ctx.insert("gad7_score".to_string(), Value::from(score));
        }
        if !self.life_story_risks.is_empty() {
            ctx.insert(
                "life_story_risks".to_string(),
                Value::from(self.life_story_risks.clone()),
            );
        }
        if !self.recent_assessments.is_empty() {
            ctx.insert(
                "recent_assessments".to_string(),
                Value::Object(self.recent_assessments.clone().into_iter().collect()),
            );
        }
        ctx
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionResult {
    pub severity: Severity,
    pub confidence: f64,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
}

impl DetectionResult {
    pub fn none() -> Self {
        Self {
            severity: Severity::None,
            confidence: 0.0,
            patterns: Vec::new(),
            reasoning: String::new(),
        }
    }
}
