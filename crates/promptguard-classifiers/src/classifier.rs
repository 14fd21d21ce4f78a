//! Classifier trait and common types

use async_trait::async_trait;
use promptguard_core::Result;
use serde::Serialize;

/// Async classification interface for shared, thread-safe classifiers
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify the given text
    async fn classify(&self, text: &str) -> Result<ClassificationResult>;

    /// Get the classifier name
    fn name(&self) -> &str;
}

/// Result of classifying one input
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationResult {
    /// The text that was classified
    pub input_text: String,

    /// Reported label
    pub label: String,

    /// Probability of the reported label (0.0-1.0)
    pub score: f32,

    /// Every label with its probability, in model index order.
    ///
    /// One entry per model output, so a name repeated in `id2label` appears
    /// more than once; `score_for` returns the first.
    pub scores: Vec<(String, f32)>,

    /// Whether the input crossed the pipeline threshold
    pub is_positive: bool,

    /// Tokenization plus inference time in milliseconds
    pub elapsed_ms: f64,
}

impl ClassificationResult {
    /// Probability for a label by name
    pub fn score_for(&self, label: &str) -> Option<f32> {
        self.scores
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, score)| *score)
    }

    /// Check if score exceeds threshold
    pub fn exceeds_threshold(&self, threshold: f32) -> bool {
        self.score >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_lookup() {
        let result = ClassificationResult {
            input_text: "hello".into(),
            label: "SAFE".into(),
            score: 0.9,
            scores: vec![("SAFE".into(), 0.9), ("INJECTION".into(), 0.1)],
            is_positive: false,
            elapsed_ms: 1.5,
        };

        assert_eq!(result.score_for("INJECTION"), Some(0.1));
        assert_eq!(result.score_for("JAILBREAK"), None);
        assert!(result.exceeds_threshold(0.9));
        assert!(!result.exceeds_threshold(0.95));
    }

    #[test]
    fn test_repeated_label_keeps_every_score() {
        let result = ClassificationResult {
            input_text: "hello".into(),
            label: "PII".into(),
            score: 0.7,
            scores: vec![("PII".into(), 0.7), ("PII".into(), 0.2)],
            is_positive: true,
            elapsed_ms: 0.0,
        };

        assert_eq!(result.scores.len(), 2);
        assert_eq!(result.score_for("PII"), Some(0.7));
    }
}
