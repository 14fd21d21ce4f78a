//! ONNX Runtime backend

use crate::backend::{Backend, HfTokenizer, InferenceSession, ModelInputs, ModelOutputs, TextTokenizer};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use promptguard_core::{Error, Result};
use std::path::Path;
use tracing::info;

const LOGITS_OUTPUT: &str = "logits";

/// Sessions built with ONNX Runtime, tokenizers with the tokenizers crate
#[derive(Debug, Clone)]
pub struct OnnxBackend {
    intra_threads: usize,
}

impl Default for OnnxBackend {
    fn default() -> Self {
        Self { intra_threads: 1 }
    }
}

impl OnnxBackend {
    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = threads.max(1);
        self
    }
}

impl Backend for OnnxBackend {
    fn load_tokenizer(&self, path: &Path, max_length: usize) -> Result<Box<dyn TextTokenizer>> {
        Ok(Box::new(HfTokenizer::from_file(path, max_length)?))
    }

    fn load_session(&self, path: &Path) -> Result<Box<dyn InferenceSession>> {
        Ok(Box::new(OnnxSession::from_file(path, self.intra_threads)?))
    }

    fn name(&self) -> &str {
        "onnxruntime"
    }
}

/// One ONNX Runtime session
pub struct OnnxSession {
    session: Session,
    wants_attention_mask: bool,
}

impl OnnxSession {
    pub fn from_file(path: &Path, intra_threads: usize) -> Result<Self> {
        info!("Loading ONNX model from {:?}", path);

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(intra_threads))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| Error::inference(format!("Failed to create ONNX session: {}", e)))?;

        let wants_attention_mask = session.inputs.iter().any(|i| i.name == "attention_mask");

        Ok(Self {
            session,
            wants_attention_mask,
        })
    }
}

impl InferenceSession for OnnxSession {
    fn predict(&mut self, inputs: &ModelInputs) -> Result<ModelOutputs> {
        let batch = inputs.input_ids.len();
        let seq_len = inputs.input_ids.first().map_or(0, Vec::len);
        let ort_err = |e: ort::Error| Error::inference(e.to_string());

        let ids = Tensor::from_array(([batch, seq_len], inputs.input_ids.concat())).map_err(ort_err)?;

        let outputs = if self.wants_attention_mask {
            let mask = Tensor::from_array(([batch, seq_len], inputs.attention_mask.concat()))
                .map_err(ort_err)?;
            self.session
                .run(ort::inputs!["input_ids" => ids, "attention_mask" => mask])
                .map_err(ort_err)?
        } else {
            self.session
                .run(ort::inputs!["input_ids" => ids])
                .map_err(ort_err)?
        };

        let (shape, data) = outputs[LOGITS_OUTPUT]
            .try_extract_tensor::<f32>()
            .map_err(ort_err)?;

        let width = shape.last().copied().unwrap_or(0).max(0) as usize;
        if width == 0 {
            return Err(Error::inference("model returned empty logits"));
        }

        Ok(ModelOutputs {
            logits: data.chunks(width).map(<[f32]>::to_vec).collect(),
        })
    }
}
