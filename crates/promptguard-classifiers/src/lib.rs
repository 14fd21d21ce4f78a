//! PromptGuard Classifiers
//!
//! Local text classification for LLM guardrails: prompt injection, jailbreak
//! attempts and PII exchange. Models are resolved through
//! [`promptguard_hub`], downloaded on first use and cached on disk.
//!
//! The entry point is [`pipeline`] (or [`TaskRegistry::pipeline`] with an
//! explicit configuration), which builds a [`Pipeline`] for a named task:
//!
//! | task | scoring | positive when |
//! |---|---|---|
//! | `prompt-injection` | softmax | P(INJECTION) ≥ threshold |
//! | `prompt-guard` | softmax | 1 − P(benign) ≥ threshold |
//! | `pii-classifier` | sigmoid | any label ≥ threshold |
//!
//! Pipelines load lazily on the first `classify` call. A `Pipeline` is meant to
//! be used from one thread at a time; wrap it in a [`SharedPipeline`] to share
//! one instance across tasks.

pub mod backend;
pub mod classifier;
pub mod decision;
pub mod labels;
pub mod model;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod pipeline;
pub mod scoring;
pub mod shared;
pub mod tasks;

pub use backend::{
    default_backend, Backend, Encoding, HfTokenizer, InferenceSession, ModelInputs, ModelOutputs,
    TextTokenizer,
};
pub use classifier::{ClassificationResult, Classifier};
pub use decision::{BinaryDecision, MultiClassDecision, MultiLabelDecision, ResultBuilder};
pub use labels::{ConfiguredLabels, GenericLabels, LabelResolver};
pub use model::{Dtype, ModelOptions, ModelResolver, ModelSpec};
pub use pipeline::Pipeline;
pub use scoring::ScoringStrategy;
pub use shared::SharedPipeline;
pub use tasks::{pipeline, TaskDefinition, TaskKind, TaskRegistry};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classifier::{ClassificationResult, Classifier};
    pub use crate::model::{Dtype, ModelOptions};
    pub use crate::pipeline::Pipeline;
    pub use crate::shared::SharedPipeline;
    pub use crate::tasks::{pipeline, TaskRegistry};
    pub use promptguard_core::{Error, Result};
}
