//! Task registry: the single place pipelines are constructed

use crate::backend::{default_backend, Backend};
use crate::decision::{BinaryDecision, MultiClassDecision, MultiLabelDecision, ResultBuilder};
use crate::model::{ModelOptions, ModelResolver, ModelSpec};
use crate::pipeline::Pipeline;
use crate::scoring::ScoringStrategy;
use promptguard_core::{Error, Result};
use promptguard_hub::{global_config, ArtifactFetcher, HubConfig, Transport};
use std::sync::Arc;
use tracing::debug;

/// Which scoring and decision rule a task uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Binary SAFE / INJECTION
    PromptInjection,
    /// Multi-class benign / injection / jailbreak
    PromptGuard,
    /// Multi-label PII exchange
    PiiClassifier,
}

impl TaskKind {
    pub fn scoring(&self) -> ScoringStrategy {
        match self {
            Self::PromptInjection | Self::PromptGuard => ScoringStrategy::Softmax,
            Self::PiiClassifier => ScoringStrategy::Sigmoid,
        }
    }

    pub fn result_builder(&self) -> Arc<dyn ResultBuilder> {
        match self {
            Self::PromptInjection => Arc::new(BinaryDecision::injection()),
            Self::PromptGuard => Arc::new(MultiClassDecision),
            Self::PiiClassifier => Arc::new(MultiLabelDecision),
        }
    }
}

/// One row of the task table
#[derive(Debug, Clone, Copy)]
pub struct TaskDefinition {
    pub name: &'static str,
    pub kind: TaskKind,
    pub default_model: &'static str,
    pub description: &'static str,
    /// `Some("")` puts the ONNX file at the repository root
    default_onnx_prefix: Option<&'static str>,
}

impl TaskDefinition {
    /// Task-level resolver defaults
    pub fn default_options(&self) -> ModelOptions {
        ModelOptions {
            onnx_prefix: self.default_onnx_prefix.map(str::to_string),
            ..Default::default()
        }
    }
}

/// Known tasks, in listing order
pub const TASKS: &[TaskDefinition] = &[
    TaskDefinition {
        name: "prompt-injection",
        kind: TaskKind::PromptInjection,
        default_model: "protectai/deberta-v3-base-injection-onnx",
        description: "Binary prompt-injection detection (SAFE / INJECTION)",
        default_onnx_prefix: Some(""),
    },
    TaskDefinition {
        name: "prompt-guard",
        kind: TaskKind::PromptGuard,
        default_model: "gravitee-io/Llama-Prompt-Guard-2-22M-onnx",
        description: "Multi-class jailbreak and injection classification",
        default_onnx_prefix: None,
    },
    TaskDefinition {
        name: "pii-classifier",
        kind: TaskKind::PiiClassifier,
        default_model: "Roblox/roblox-pii-classifier",
        description: "Multi-label detection of asking for or giving PII",
        default_onnx_prefix: None,
    },
];

/// Builds pipelines for named tasks
#[derive(Clone)]
pub struct TaskRegistry {
    config: HubConfig,
    backend: Arc<dyn Backend>,
    transport: Option<Arc<dyn Transport>>,
}

impl TaskRegistry {
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            backend: default_backend(),
            transport: None,
        }
    }

    /// Registry over the process-wide configuration
    pub fn from_global() -> Self {
        Self::new(global_config())
    }

    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = backend;
        self
    }

    /// Route downloads through a custom transport
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Names of every known task
    pub fn tasks() -> Vec<&'static str> {
        TASKS.iter().map(|t| t.name).collect()
    }

    /// Look up a task by name
    pub fn definition(task: &str) -> Result<&'static TaskDefinition> {
        TASKS.iter().find(|t| t.name == task).ok_or_else(|| {
            Error::config(format!(
                "unknown task '{}'; valid tasks are: {}",
                task,
                Self::tasks().join(", ")
            ))
        })
    }

    /// Build a pipeline for `task`.
    ///
    /// `model` defaults to the task's model. `options` are merged over the
    /// task defaults, caller values winning.
    pub fn pipeline(&self, task: &str, model: Option<&str>, options: ModelOptions) -> Result<Pipeline> {
        let definition = Self::definition(task)?;
        let model_id = model.unwrap_or(definition.default_model);
        if model_id.trim().is_empty() {
            return Err(Error::config("model id must not be empty"));
        }

        let options = options.merge(&definition.default_options());
        validate(&options)?;

        debug!("Building {} pipeline for {} with {:?}", task, model_id, options);

        let fetcher = match &self.transport {
            Some(transport) => ArtifactFetcher::with_transport(self.config.clone(), transport.clone()),
            None => ArtifactFetcher::new(self.config.clone()),
        }
        .with_cache_dir(options.cache_dir.clone());

        let resolver = ModelResolver::new(ModelSpec::from_options(model_id, &options), fetcher);

        let mut pipeline = Pipeline::new(
            task,
            resolver,
            self.backend.clone(),
            definition.kind.scoring(),
            definition.kind.result_builder(),
        );
        if let Some(threshold) = options.threshold {
            pipeline = pipeline.with_threshold(threshold);
        }
        if let Some(max_length) = options.max_length {
            pipeline = pipeline.with_max_length(max_length);
        }
        Ok(pipeline)
    }
}

fn validate(options: &ModelOptions) -> Result<()> {
    if let Some(threshold) = options.threshold {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::config(format!(
                "threshold must be within [0, 1], got {}",
                threshold
            )));
        }
    }
    if options.max_length == Some(0) {
        return Err(Error::config("max_length must be positive"));
    }
    if options.local_path.is_some() && options.cache_dir.is_some() {
        return Err(Error::config(
            "local_path and cache_dir cannot be combined; local models are never cached",
        ));
    }
    Ok(())
}

/// Build a pipeline with the process-wide configuration and default backend
pub fn pipeline(task: &str, model: Option<&str>, options: ModelOptions) -> Result<Pipeline> {
    TaskRegistry::from_global().pipeline(task, model, options)
}
