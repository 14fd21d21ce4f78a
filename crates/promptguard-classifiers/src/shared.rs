//! Thread-safe handle over one pipeline.
//!
//! Calls are serialized by a mutex, so load/unload never race with classify on
//! the same instance. The async [`Classifier`] impl runs the blocking work on
//! tokio's blocking pool.

use crate::classifier::{ClassificationResult, Classifier};
use crate::pipeline::Pipeline;
use async_trait::async_trait;
use parking_lot::Mutex;
use promptguard_core::{Error, Result};
use std::sync::Arc;

#[derive(Clone)]
pub struct SharedPipeline {
    name: String,
    inner: Arc<Mutex<Pipeline>>,
}

impl SharedPipeline {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            name: pipeline.task().to_string(),
            inner: Arc::new(Mutex::new(pipeline)),
        }
    }

    pub fn classify_blocking(&self, text: &str) -> Result<ClassificationResult> {
        self.inner.lock().classify(text)
    }

    pub fn load_blocking(&self) -> Result<()> {
        self.inner.lock().load()
    }

    /// Load on the blocking pool
    pub async fn load(&self) -> Result<()> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.lock().load())
            .await
            .map_err(|e| Error::internal(format!("load task failed: {}", e)))?
    }

    pub fn unload(&self) {
        self.inner.lock().unload();
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.lock().is_loaded()
    }

    pub fn ready(&self) -> bool {
        self.inner.lock().ready()
    }

    /// Run a closure with exclusive access to the pipeline
    pub fn with_pipeline<R>(&self, f: impl FnOnce(&mut Pipeline) -> R) -> R {
        f(&mut self.inner.lock())
    }
}

#[async_trait]
impl Classifier for SharedPipeline {
    async fn classify(&self, text: &str) -> Result<ClassificationResult> {
        let inner = self.inner.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || inner.lock().classify(&text))
            .await
            .map_err(|e| Error::internal(format!("classification task failed: {}", e)))?
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl From<Pipeline> for SharedPipeline {
    fn from(pipeline: Pipeline) -> Self {
        Self::new(pipeline)
    }
}
