//! Turning per-label probabilities into a typed result.
//!
//! Each task has its own rule for which label is reported and what counts as
//! positive. The rules are independent of how the probabilities were produced.

use crate::classifier::ClassificationResult;
use crate::labels::{ConfiguredLabels, LabelResolver};
use crate::scoring::argmax;
use std::sync::Arc;

/// Builds a [`ClassificationResult`] from probabilities
pub trait ResultBuilder: Send + Sync {
    /// Labels that do not depend on the model's `config.json`.
    ///
    /// When `None`, the pipeline reads `id2label` from the model config.
    fn fixed_labels(&self) -> Option<Arc<dyn LabelResolver>> {
        None
    }

    /// Which index to report, its score, and whether the input is positive
    fn decide(&self, scores: &[f32], labels: &dyn LabelResolver, threshold: f32) -> Decision;

    fn build(
        &self,
        text: &str,
        scores: &[f32],
        labels: &dyn LabelResolver,
        threshold: f32,
        elapsed_ms: f64,
    ) -> ClassificationResult {
        let decision = self.decide(scores, labels, threshold);
        ClassificationResult {
            input_text: text.to_string(),
            label: labels.label(decision.index),
            score: decision.score,
            scores: scores
                .iter()
                .enumerate()
                .map(|(i, &s)| (labels.label(i), s))
                .collect(),
            is_positive: decision.is_positive,
            elapsed_ms,
        }
    }
}

/// Outcome of a decision rule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub index: usize,
    pub score: f32,
    pub is_positive: bool,
}

/// Two mutually exclusive classes, `SAFE` and `INJECTION`.
///
/// Positive when P(INJECTION) meets the threshold; the reported score is the
/// probability of the reported label.
#[derive(Debug, Clone)]
pub struct BinaryDecision {
    labels: Arc<ConfiguredLabels>,
    positive_index: usize,
}

impl BinaryDecision {
    pub fn new(negative: &str, positive: &str) -> Self {
        Self {
            labels: Arc::new(ConfiguredLabels::from_list([negative, positive])),
            positive_index: 1,
        }
    }

    /// `SAFE` / `INJECTION`
    pub fn injection() -> Self {
        Self::new("SAFE", "INJECTION")
    }
}

impl ResultBuilder for BinaryDecision {
    fn fixed_labels(&self) -> Option<Arc<dyn LabelResolver>> {
        Some(self.labels.clone())
    }

    fn decide(&self, scores: &[f32], _labels: &dyn LabelResolver, threshold: f32) -> Decision {
        let positive = scores.get(self.positive_index).copied().unwrap_or(0.0);
        if positive >= threshold {
            Decision {
                index: self.positive_index,
                score: positive,
                is_positive: true,
            }
        } else {
            let negative_index = 1 - self.positive_index;
            Decision {
                index: negative_index,
                score: scores.get(negative_index).copied().unwrap_or(1.0 - positive),
                is_positive: false,
            }
        }
    }
}

/// Several mutually exclusive classes, one of them benign.
///
/// The benign class is the label named `BENIGN` or `SAFE`, else index 0. The
/// input is positive when the probability mass outside the benign class meets
/// the threshold; the most likely non-benign label is then reported. Otherwise
/// the overall most likely label is reported.
#[derive(Debug, Clone, Default)]
pub struct MultiClassDecision;

impl MultiClassDecision {
    const BENIGN_NAMES: [&'static str; 2] = ["BENIGN", "SAFE"];

    fn benign_index(labels: &dyn LabelResolver, count: usize) -> usize {
        Self::BENIGN_NAMES
            .iter()
            .find_map(|name| labels.find(name, count))
            .unwrap_or(0)
    }
}

impl ResultBuilder for MultiClassDecision {
    fn decide(&self, scores: &[f32], labels: &dyn LabelResolver, threshold: f32) -> Decision {
        let benign = Self::benign_index(labels, scores.len());
        let benign_score = scores.get(benign).copied().unwrap_or(0.0);
        let is_positive = scores.len() > 1 && 1.0 - benign_score >= threshold;

        let best = if is_positive {
            scores
                .iter()
                .copied()
                .enumerate()
                .filter(|(i, _)| *i != benign)
                .fold(None, |best: Option<(usize, f32)>, (i, s)| match best {
                    Some((_, b)) if b >= s => best,
                    _ => Some((i, s)),
                })
        } else {
            argmax(scores)
        };

        let (index, score) = best.unwrap_or((benign, benign_score));
        Decision {
            index,
            score,
            is_positive,
        }
    }
}

/// Independent labels; several may hold at once.
///
/// Positive when any label meets the threshold. The reported label is simply
/// the highest-scoring one.
#[derive(Debug, Clone, Default)]
pub struct MultiLabelDecision;

impl ResultBuilder for MultiLabelDecision {
    fn decide(&self, scores: &[f32], _labels: &dyn LabelResolver, threshold: f32) -> Decision {
        let (index, score) = argmax(scores).unwrap_or((0, 0.0));
        Decision {
            index,
            score,
            is_positive: scores.iter().any(|&s| s >= threshold),
        }
    }
}
