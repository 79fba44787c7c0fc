use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::domain::crisis::model::detection::{DetectionContext, DetectionResult};
use crate::domain::crisis::port::crisis_classifier::CrisisClassifier;

/// Remote model that scores a message. The engine bounds each call with its
/// own timeout; the client timeout here only guards against dead sockets.
pub struct HttpCrisisClassifier {
    client: Client,
    url: String,
    token: Option<String>,
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    message: &'a str,
    context: &'a DetectionContext,
}

impl HttpCrisisClassifier {
    pub fn new(url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            url: url.into(),
            token,
        })
    }
}

#[async_trait]
impl CrisisClassifier for HttpCrisisClassifier {
    fn name(&self) -> &str {
        "http"
    }

    async fn analyze(&self, message: &str, context: &DetectionContext) -> Result<DetectionResult> {
        let mut req = self
            .client
            .post(&self.url)
            .json(&ClassifyRequest { message, context });
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| anyhow!("Classifier request failed: {}", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Classifier returned {}: {}", status, text));
        }

        resp.json::<DetectionResult>()
            .await
            .map_err(|e| anyhow!("Failed to parse classifier response: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_carries_message_and_context() {
        let context = DetectionContext {
            user_id: "resident-1".into(),
            session_id: "session-1".into(),
            phq9_score: Some(21),
            ..Default::default()
        };
        let body = serde_json::to_value(ClassifyRequest {
            message: "I can't go on",
            context: &context,
        })
        .unwrap();

        assert_eq!(body["message"], "I can't go on");
        assert_eq!(body["context"]["user_id"], "resident-1");
        assert_eq!(body["context"]["phq9_score"], 21);
        assert!(body["context"].get("gad7_score").is_none());
    }

    #[test]
    fn response_parses_with_optional_fields_missing() {
        let parsed: DetectionResult =
            serde_json::from_str(r#"{"severity":"URGENT","confidence":0.82}"#).unwrap();
        assert_eq!(parsed.confidence, 0.82);
        assert!(parsed.patterns.is_empty());
    }
}
