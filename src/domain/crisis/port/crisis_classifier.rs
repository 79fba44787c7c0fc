use anyhow::Result;
use async_trait::async_trait;

use crate::domain::crisis::model::detection::{DetectionContext, DetectionResult};

#[async_trait]
pub trait CrisisClassifier: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    async fn analyze(&self, message: &str, context: &DetectionContext) -> Result<DetectionResult>;
}
