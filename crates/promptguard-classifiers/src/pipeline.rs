//! Classification pipeline: lazy model loading plus scoring.
//!
//! A pipeline starts unloaded. The first `classify` (or an explicit `load`)
//! resolves the tokenizer and model files, which may download them, and builds
//! the tokenizer and session. `unload` drops both; the next `classify` loads
//! again.
//!
//! Errors from obtaining files keep their kind (`ModelNotFound`, `Offline`,
//! `Download`). Anything that fails while tokenizing or running the model is
//! reported as `Inference`.

use crate::backend::{Backend, InferenceSession, ModelInputs, TextTokenizer, DEFAULT_MAX_LENGTH};
use crate::classifier::ClassificationResult;
use crate::decision::ResultBuilder;
use crate::labels::{labels_from_config, LabelResolver};
use crate::model::ModelResolver;
use crate::scoring::ScoringStrategy;
use promptguard_core::{Error, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Default decision threshold
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// A tokenizer plus model for one task
pub struct Pipeline {
    task: String,
    resolver: ModelResolver,
    backend: Arc<dyn Backend>,
    scoring: ScoringStrategy,
    builder: Arc<dyn ResultBuilder>,
    threshold: f32,
    max_length: usize,
    /// Resolved on the first load and kept across unload
    labels: Option<Arc<dyn LabelResolver>>,
    state: State,
}

/// Unloaded -> Loaded, and back on `unload`. The transient loading step only
/// exists inside `load(&mut self)`, where no other call can observe it.
enum State {
    Unloaded,
    Loaded(LoadedModel),
}

struct LoadedModel {
    tokenizer: Box<dyn TextTokenizer>,
    session: Box<dyn InferenceSession>,
}

impl Pipeline {
    pub fn new(
        task: impl Into<String>,
        resolver: ModelResolver,
        backend: Arc<dyn Backend>,
        scoring: ScoringStrategy,
        builder: Arc<dyn ResultBuilder>,
    ) -> Self {
        Self {
            task: task.into(),
            resolver,
            backend,
            scoring,
            builder,
            threshold: DEFAULT_THRESHOLD,
            max_length: DEFAULT_MAX_LENGTH,
            labels: None,
            state: State::Unloaded,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn model_id(&self) -> &str {
        &self.resolver.spec().registry_id
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn scoring(&self) -> ScoringStrategy {
        self.scoring
    }

    pub fn resolver(&self) -> &ModelResolver {
        &self.resolver
    }

    /// Load the tokenizer and model if not already loaded
    pub fn load(&mut self) -> Result<()> {
        if self.is_loaded() {
            return Ok(());
        }

        info!("Loading {} model {}", self.task, self.model_id());
        let start = Instant::now();

        if self.labels.is_none() {
            self.labels = Some(match self.builder.fixed_labels() {
                Some(labels) => labels,
                None => labels_from_config(&self.resolver.config_json()),
            });
        }
        let tokenizer_path = self.resolver.tokenizer_path()?;
        let onnx_path = self.resolver.onnx_path()?;

        let tokenizer = self.backend.load_tokenizer(&tokenizer_path, self.max_length)?;
        let session = self.backend.load_session(&onnx_path)?;

        self.state = State::Loaded(LoadedModel { tokenizer, session });

        info!(
            "Loaded {} model {} in {:.1}ms",
            self.task,
            self.model_id(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(())
    }

    /// Drop the tokenizer and session
    pub fn unload(&mut self) {
        if let State::Loaded(_) = std::mem::replace(&mut self.state, State::Unloaded) {
            info!("Unloaded {} model {}", self.task, self.model_id());
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, State::Loaded(_))
    }

    /// Loaded, or every required file is already on disk
    pub fn ready(&self) -> bool {
        self.is_loaded() || self.resolver.ready()
    }

    /// Download every model file without loading
    pub fn preload(&self) -> Result<()> {
        self.resolver.preload()
    }

    /// Classify one input, loading the model first if needed
    pub fn classify(&mut self, text: &str) -> Result<ClassificationResult> {
        self.load()?;

        let (State::Loaded(model), Some(labels)) = (&mut self.state, &self.labels) else {
            return Err(Error::internal("pipeline not loaded after load()"));
        };

        let start = Instant::now();
        let scores = run(model, self.scoring, text).map_err(Error::into_inference)?;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let result = self.builder.build(
            text,
            &scores,
            labels.as_ref(),
            self.threshold,
            elapsed_ms,
        );

        debug!(
            "{}: {} ({:.3}) positive={} in {:.2}ms",
            self.task, result.label, result.score, result.is_positive, elapsed_ms
        );
        metrics::counter!(
            "promptguard_classifications_total",
            "task" => self.task.clone(),
            "positive" => if result.is_positive { "true" } else { "false" }
        )
        .increment(1);
        metrics::histogram!("promptguard_classification_latency_ms", "task" => self.task.clone())
            .record(elapsed_ms);

        Ok(result)
    }

    /// Classify each input in order
    pub fn classify_batch<S: AsRef<str>>(&mut self, texts: &[S]) -> Result<Vec<ClassificationResult>> {
        texts.iter().map(|t| self.classify(t.as_ref())).collect()
    }

    /// Whether the input crosses the threshold
    pub fn is_positive(&mut self, text: &str) -> Result<bool> {
        Ok(self.classify(text)?.is_positive)
    }
}

fn run(model: &mut LoadedModel, scoring: ScoringStrategy, text: &str) -> Result<Vec<f32>> {
    let encoding = model.tokenizer.encode(text)?;
    let outputs = model.session.predict(&ModelInputs::single(encoding))?;

    let logits = outputs
        .logits
        .into_iter()
        .next()
        .filter(|row| !row.is_empty())
        .ok_or_else(|| Error::inference("model returned no logits"))?;

    Ok(scoring.apply(&logits))
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("task", &self.task)
            .field("model", &self.model_id())
            .field("backend", &self.backend.name())
            .field("scoring", &self.scoring)
            .field("threshold", &self.threshold)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
