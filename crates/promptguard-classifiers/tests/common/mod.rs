//! Stub tokenizer, session and backend for pipeline tests
//!
//! The stub backend never reads model files; it only needs them to exist so
//! the resolver is satisfied.

#![allow(dead_code)]

use promptguard_classifiers::{
    Backend, Encoding, InferenceSession, ModelInputs, ModelOutputs, TextTokenizer,
};
use promptguard_core::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// What the stub session does on `predict`
#[derive(Clone)]
pub enum SessionBehavior {
    Logits(Vec<Vec<f32>>),
    FailWith(fn() -> Error),
}

/// Configurable backend counting how often it builds collaborators
pub struct StubBackend {
    pub encoding: Encoding,
    pub behavior: SessionBehavior,
    pub fail_tokenizer: bool,
    pub tokenizer_loads: AtomicUsize,
    pub session_loads: AtomicUsize,
    pub predictions: Arc<AtomicUsize>,
    pub last_inputs: Arc<parking_lot::Mutex<Option<ModelInputs>>>,
}

impl StubBackend {
    pub fn with_logits(logits: Vec<Vec<f32>>) -> Self {
        Self {
            encoding: Encoding {
                ids: vec![1, 2, 3],
                attention_mask: vec![1, 1, 1],
            },
            behavior: SessionBehavior::Logits(logits),
            fail_tokenizer: false,
            tokenizer_loads: AtomicUsize::new(0),
            session_loads: AtomicUsize::new(0),
            predictions: Arc::new(AtomicUsize::new(0)),
            last_inputs: Arc::new(parking_lot::Mutex::new(None)),
        }
    }

    pub fn failing_session(error: fn() -> Error) -> Self {
        Self {
            behavior: SessionBehavior::FailWith(error),
            ..Self::with_logits(vec![])
        }
    }

    pub fn failing_tokenizer() -> Self {
        Self {
            fail_tokenizer: true,
            ..Self::with_logits(vec![vec![0.0, 0.0]])
        }
    }

    pub fn loads(&self) -> usize {
        self.session_loads.load(Ordering::SeqCst)
    }
}

struct StubTokenizer {
    encoding: Encoding,
    fail: bool,
}

impl TextTokenizer for StubTokenizer {
    fn encode(&self, _text: &str) -> Result<Encoding> {
        if self.fail {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "vocabulary corrupted",
            )));
        }
        Ok(self.encoding.clone())
    }
}

struct StubSession {
    behavior: SessionBehavior,
    predictions: Arc<AtomicUsize>,
    last_inputs: Arc<parking_lot::Mutex<Option<ModelInputs>>>,
}

impl InferenceSession for StubSession {
    fn predict(&mut self, inputs: &ModelInputs) -> Result<ModelOutputs> {
        self.predictions.fetch_add(1, Ordering::SeqCst);
        *self.last_inputs.lock() = Some(inputs.clone());
        match &self.behavior {
            SessionBehavior::Logits(logits) => Ok(ModelOutputs {
                logits: logits.clone(),
            }),
            SessionBehavior::FailWith(make) => Err(make()),
        }
    }
}

impl Backend for StubBackend {
    fn load_tokenizer(&self, path: &Path, _max_length: usize) -> Result<Box<dyn TextTokenizer>> {
        assert!(path.is_file(), "tokenizer path {:?} should exist", path);
        self.tokenizer_loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubTokenizer {
            encoding: self.encoding.clone(),
            fail: self.fail_tokenizer,
        }))
    }

    fn load_session(&self, path: &Path) -> Result<Box<dyn InferenceSession>> {
        assert!(path.is_file(), "model path {:?} should exist", path);
        self.session_loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubSession {
            behavior: self.behavior.clone(),
            predictions: self.predictions.clone(),
            last_inputs: self.last_inputs.clone(),
        }))
    }

    fn name(&self) -> &str {
        "stub"
    }
}

/// Write a local model directory with the given ONNX file and optional config
pub fn write_model_dir(dir: &Path, onnx_file: &str, config: Option<&str>) -> PathBuf {
    let onnx = dir.join(onnx_file);
    std::fs::create_dir_all(onnx.parent().unwrap()).unwrap();
    std::fs::write(&onnx, b"stub graph").unwrap();
    std::fs::write(dir.join("tokenizer.json"), b"{}").unwrap();
    if let Some(config) = config {
        std::fs::write(dir.join("config.json"), config).unwrap();
    }
    dir.to_path_buf()
}

/// Logit whose sigmoid is `p`
pub fn logit(p: f32) -> f32 {
    (p / (1.0 - p)).ln()
}
