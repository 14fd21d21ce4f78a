//! Tokenizer and inference-session interfaces.
//!
//! A [`Backend`] builds both collaborators from files on disk. The pipeline
//! owns what it builds and drops both on unload.

use promptguard_core::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use tokenizers::{Tokenizer, TruncationParams};

/// Default token limit for truncation
pub const DEFAULT_MAX_LENGTH: usize = 512;

/// Token ids and attention mask for one input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Encoding {
    pub ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
}

/// Batched model inputs, one row per input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelInputs {
    pub input_ids: Vec<Vec<i64>>,
    pub attention_mask: Vec<Vec<i64>>,
}

impl ModelInputs {
    /// Batch of one
    pub fn single(encoding: Encoding) -> Self {
        Self {
            input_ids: vec![encoding.ids],
            attention_mask: vec![encoding.attention_mask],
        }
    }
}

/// Raw model outputs, one logits row per input
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelOutputs {
    pub logits: Vec<Vec<f32>>,
}

/// Text to token ids
pub trait TextTokenizer: Send {
    fn encode(&self, text: &str) -> Result<Encoding>;
}

/// Token ids to logits
pub trait InferenceSession: Send {
    fn predict(&mut self, inputs: &ModelInputs) -> Result<ModelOutputs>;
}

/// Builds tokenizers and sessions from model files
pub trait Backend: Send + Sync {
    fn load_tokenizer(&self, path: &Path, max_length: usize) -> Result<Box<dyn TextTokenizer>>;

    fn load_session(&self, path: &Path) -> Result<Box<dyn InferenceSession>>;

    fn name(&self) -> &str;
}

/// `tokenizer.json` through the HuggingFace tokenizers crate
pub struct HfTokenizer {
    inner: Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(path: &Path, max_length: usize) -> Result<Self> {
        let mut inner = Tokenizer::from_file(path)
            .map_err(|e| Error::inference(format!("Failed to load tokenizer {:?}: {}", path, e)))?;

        inner
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| Error::inference(format!("Failed to configure truncation: {}", e)))?;
        inner.with_padding(None);

        Ok(Self { inner })
    }
}

impl TextTokenizer for HfTokenizer {
    fn encode(&self, text: &str) -> Result<Encoding> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| Error::inference(format!("Tokenization failed: {}", e)))?;

        Ok(Encoding {
            ids: encoding.get_ids().iter().map(|&id| id as i64).collect(),
            attention_mask: encoding
                .get_attention_mask()
                .iter()
                .map(|&m| m as i64)
                .collect(),
        })
    }
}

/// Backend for builds without an inference runtime.
///
/// Tokenizers load normally; sessions fail with a configuration error.
#[derive(Debug, Default)]
pub struct TokenizerOnlyBackend;

impl Backend for TokenizerOnlyBackend {
    fn load_tokenizer(&self, path: &Path, max_length: usize) -> Result<Box<dyn TextTokenizer>> {
        Ok(Box::new(HfTokenizer::from_file(path, max_length)?))
    }

    fn load_session(&self, path: &Path) -> Result<Box<dyn InferenceSession>> {
        Err(Error::config(format!(
            "cannot run {:?}: promptguard-classifiers was built without the `onnx` feature",
            path
        )))
    }

    fn name(&self) -> &str {
        "tokenizer-only"
    }
}

/// ONNX Runtime when the `onnx` feature is enabled
pub fn default_backend() -> Arc<dyn Backend> {
    #[cfg(feature = "onnx")]
    {
        Arc::new(crate::onnx::OnnxBackend::default())
    }
    #[cfg(not(feature = "onnx"))]
    {
        Arc::new(TokenizerOnlyBackend)
    }
}
