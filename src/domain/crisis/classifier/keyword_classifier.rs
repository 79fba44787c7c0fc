use anyhow::Result;
use async_trait::async_trait;

use crate::core::persistence::alerts::crisis_alert_entity::Severity;
use crate::domain::crisis::model::detection::{DetectionContext, DetectionResult};
use crate::domain::crisis::port::crisis_classifier::CrisisClassifier;

/// PHQ-9 total at or above which a message with no matched phrase is still
/// flagged for routine follow-up.
const PHQ9_SEVERE: u32 = 20;

#[derive(Debug, Clone)]
pub struct KeywordRule {
    pub phrase: &'static str,
    pub label: &'static str,
    pub severity: Severity,
    pub weight: f64,
}

fn rule(phrase: &'static str, label: &'static str, severity: Severity, weight: f64) -> KeywordRule {
    KeywordRule {
        phrase,
        label,
        severity,
        weight,
    }
}

/// Phrase table used when the primary classifier is unreachable.
pub fn default_rules() -> Vec<KeywordRule> {
    vec![
        rule("kill myself", "suicidal_intent", Severity::Immediate, 0.95),
        rule("end my life", "suicidal_intent", Severity::Immediate, 0.95),
        rule("suicide", "suicidal_ideation", Severity::Immediate, 0.85),
        rule("overdose", "self_harm_method", Severity::Immediate, 0.85),
        rule("want to die", "death_wish", Severity::Urgent, 0.8),
        rule("hurt myself", "self_harm", Severity::Urgent, 0.8),
        rule("better off without me", "burden_belief", Severity::Urgent, 0.75),
        rule("no reason to live", "hopelessness", Severity::Elevated, 0.7),
        rule("can't go on", "hopelessness", Severity::Elevated, 0.65),
        rule("hopeless", "hopelessness", Severity::Moderate, 0.5),
        rule("so alone", "isolation", Severity::Moderate, 0.45),
        rule("can't sleep", "sleep_disturbance", Severity::Moderate, 0.35),
    ]
}

/// Local, dependency-free classifier: highest matched phrase wins.
#[derive(Debug, Clone)]
pub struct KeywordCrisisClassifier {
    rules: Vec<KeywordRule>,
}

impl Default for KeywordCrisisClassifier {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl KeywordCrisisClassifier {
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        Self { rules }
    }

    pub fn evaluate(&self, message: &str, context: &DetectionContext) -> DetectionResult {
        let normalized = message.to_lowercase().replace('’', "'");

        let matched: Vec<&KeywordRule> = self
            .rules
            .iter()
            .filter(|r| normalized.contains(r.phrase))
            .collect();

        let Some(top) = matched.iter().map(|r| r.severity).max() else {
            return Self::score_only(context);
        };

        let confidence = matched
            .iter()
            .filter(|r| r.severity == top)
            .map(|r| r.weight)
            .fold(0.0_f64, f64::max);

        let mut patterns: Vec<String> = Vec::new();
        for r in &matched {
            if !patterns.iter().any(|p| p == r.label) {
                patterns.push(r.label.to_string());
            }
        }

        DetectionResult {
            severity: top,
            confidence,
            reasoning: format!(
                "keyword fallback matched {} phrase(s); highest tier {}",
                matched.len(),
                top.as_code()
            ),
            patterns,
        }
    }

    fn score_only(context: &DetectionContext) -> DetectionResult {
        match context.phq9_score {
            Some(score) if score >= PHQ9_SEVERE => DetectionResult {
                severity: Severity::Moderate,
                confidence: 0.4,
                patterns: vec!["phq9_severe".into()],
                reasoning: format!("no phrase matched; PHQ-9 score {score} is in the severe range"),
            },
            _ => DetectionResult::none(),
        }
    }
}

#[async_trait]
impl CrisisClassifier for KeywordCrisisClassifier {
    fn name(&self) -> &str {
        "keyword-fallback"
    }

    async fn analyze(&self, message: &str, context: &DetectionContext) -> Result<DetectionResult> {
        Ok(self.evaluate(message, context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highest_tier_wins() {
        let classifier = KeywordCrisisClassifier::default();
        let result = classifier.evaluate(
            "I feel hopeless and I want to end my life",
            &DetectionContext::default(),
        );

        assert_eq!(result.severity, Severity::Immediate);
        assert!((result.confidence - 0.95).abs() < f64::EPSILON);
        assert!(result.patterns.contains(&"suicidal_intent".to_string()));
        assert!(result.patterns.contains(&"hopelessness".to_string()));
    }

    #[test]
    fn curly_apostrophes_still_match() {
        let classifier = KeywordCrisisClassifier::default();
        let result = classifier.evaluate("I can’t go on like this", &DetectionContext::default());
        assert_eq!(result.severity, Severity::Elevated);
    }

    #[test]
    fn benign_message_is_none_unless_phq9_is_severe() {
        let classifier = KeywordCrisisClassifier::default();
        let mut ctx = DetectionContext::default();

        assert_eq!(classifier.evaluate("lunch was nice", &ctx).severity, Severity::None);

        ctx.phq9_score = Some(22);
        let result = classifier.evaluate("lunch was nice", &ctx);
        assert_eq!(result.severity, Severity::Moderate);
        assert_eq!(result.patterns, vec!["phq9_severe".to_string()]);
    }
}
