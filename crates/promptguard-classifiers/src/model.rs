//! Model selection and artifact resolution

use promptguard_core::{Error, Result};
use promptguard_hub::config::DEFAULT_REVISION;
use promptguard_hub::{ArtifactFetcher, ArtifactRef, Requirement};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Tokenizer definition, always required
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Model config carrying `id2label`
pub const CONFIG_FILE: &str = "config.json";

/// Tokenizer-side files fetched by [`ModelResolver::preload`]
pub const TOKENIZER_SIDE_FILES: [&str; 4] = [
    TOKENIZER_FILE,
    CONFIG_FILE,
    "special_tokens_map.json",
    "tokenizer_config.json",
];

const DEFAULT_ONNX_PREFIX: &str = "onnx";

/// Numeric precision variant of the exported model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    #[default]
    Fp32,
    Fp16,
    Q8,
    Int8,
    Q4,
    Q4f16,
}

impl Dtype {
    /// Artifact file stem for this precision
    pub fn file_stem(&self) -> &'static str {
        match self {
            Self::Fp32 => "model",
            Self::Fp16 => "model_fp16",
            Self::Q8 | Self::Int8 => "model_quantized",
            Self::Q4 => "model_q4",
            Self::Q4f16 => "model_q4f16",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fp32 => "fp32",
            Self::Fp16 => "fp16",
            Self::Q8 => "q8",
            Self::Int8 => "int8",
            Self::Q4 => "q4",
            Self::Q4f16 => "q4f16",
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dtype {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fp32" => Ok(Self::Fp32),
            "fp16" => Ok(Self::Fp16),
            "q8" => Ok(Self::Q8),
            "int8" => Ok(Self::Int8),
            "q4" => Ok(Self::Q4),
            "q4f16" => Ok(Self::Q4f16),
            other => Err(Error::config(format!(
                "unknown dtype '{}' (expected one of fp32, fp16, q8, int8, q4, q4f16)",
                other
            ))),
        }
    }
}

/// Caller- or task-supplied options; unset fields fall back to defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelOptions {
    #[serde(default)]
    pub dtype: Option<Dtype>,

    /// Directory of the ONNX file inside the registry entry; `""` is the root
    #[serde(default)]
    pub onnx_prefix: Option<String>,

    /// Overrides the precision-derived file stem
    #[serde(default)]
    pub model_file_name: Option<String>,

    #[serde(default)]
    pub revision: Option<String>,

    /// Read every file from this directory instead of the registry
    #[serde(default)]
    pub local_path: Option<PathBuf>,

    /// Cache root for this pipeline only
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    #[serde(default)]
    pub threshold: Option<f32>,

    /// Token limit passed to the tokenizer's truncation
    #[serde(default)]
    pub max_length: Option<usize>,
}

impl ModelOptions {
    /// Fill unset fields from `defaults`; values already set win
    pub fn merge(self, defaults: &ModelOptions) -> ModelOptions {
        ModelOptions {
            dtype: self.dtype.or(defaults.dtype),
            onnx_prefix: self.onnx_prefix.or_else(|| defaults.onnx_prefix.clone()),
            model_file_name: self
                .model_file_name
                .or_else(|| defaults.model_file_name.clone()),
            revision: self.revision.or_else(|| defaults.revision.clone()),
            local_path: self.local_path.or_else(|| defaults.local_path.clone()),
            cache_dir: self.cache_dir.or_else(|| defaults.cache_dir.clone()),
            threshold: self.threshold.or(defaults.threshold),
            max_length: self.max_length.or(defaults.max_length),
        }
    }

    pub fn with_dtype(mut self, dtype: Dtype) -> Self {
        self.dtype = Some(dtype);
        self
    }

    pub fn with_onnx_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.onnx_prefix = Some(prefix.into());
        self
    }

    pub fn with_model_file_name(mut self, name: impl Into<String>) -> Self {
        self.model_file_name = Some(name.into());
        self
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }
}

/// Which model to run and where its files come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub registry_id: String,
    pub dtype: Dtype,
    pub onnx_prefix: Option<String>,
    pub file_name_stem: Option<String>,
    pub local_path: Option<PathBuf>,
    pub revision: String,
}

impl ModelSpec {
    pub fn new(registry_id: impl Into<String>) -> Self {
        Self {
            registry_id: registry_id.into(),
            dtype: Dtype::default(),
            onnx_prefix: None,
            file_name_stem: None,
            local_path: None,
            revision: DEFAULT_REVISION.to_string(),
        }
    }

    pub fn from_options(registry_id: impl Into<String>, options: &ModelOptions) -> Self {
        Self {
            registry_id: registry_id.into(),
            dtype: options.dtype.unwrap_or_default(),
            onnx_prefix: options.onnx_prefix.clone(),
            file_name_stem: options.model_file_name.clone(),
            local_path: options.local_path.clone(),
            revision: options
                .revision
                .clone()
                .unwrap_or_else(|| DEFAULT_REVISION.to_string()),
        }
    }

    /// `{onnx_prefix}/{stem}.onnx`, without a directory when the prefix is empty
    pub fn onnx_file(&self) -> String {
        let prefix = self
            .onnx_prefix
            .as_deref()
            .unwrap_or(DEFAULT_ONNX_PREFIX)
            .trim_matches('/');
        let stem = self
            .file_name_stem
            .as_deref()
            .map(|s| s.trim_end_matches(".onnx"))
            .unwrap_or_else(|| self.dtype.file_stem());

        if prefix.is_empty() {
            format!("{}.onnx", stem)
        } else {
            format!("{}/{}.onnx", prefix, stem)
        }
    }
}

/// Resolves the tokenizer and ONNX files for one model
#[derive(Clone)]
pub struct ModelResolver {
    spec: ModelSpec,
    fetcher: ArtifactFetcher,
}

impl ModelResolver {
    pub fn new(spec: ModelSpec, fetcher: ArtifactFetcher) -> Self {
        Self { spec, fetcher }
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn fetcher(&self) -> &ArtifactFetcher {
        &self.fetcher
    }

    /// Remote reference for a file of this model
    pub fn artifact(&self, file: &str) -> Result<ArtifactRef> {
        ArtifactRef::new(&self.spec.registry_id, file, &self.spec.revision)
    }

    pub fn onnx_file(&self) -> String {
        self.spec.onnx_file()
    }

    /// Path to the ONNX model, downloading it if needed
    pub fn onnx_path(&self) -> Result<PathBuf> {
        self.required_file(&self.onnx_file())
    }

    /// Path to `tokenizer.json`, downloading it if needed
    pub fn tokenizer_path(&self) -> Result<PathBuf> {
        self.required_file(TOKENIZER_FILE)
    }

    /// Parsed `config.json`, or an empty object when it cannot be had
    pub fn config_json(&self) -> serde_json::Value {
        let empty = || serde_json::Value::Object(Default::default());
        match &self.spec.local_path {
            Some(dir) => {
                let path = dir.join(CONFIG_FILE);
                std::fs::read_to_string(&path)
                    .ok()
                    .and_then(|text| serde_json::from_str(&text).ok())
                    .unwrap_or_else(empty)
            }
            None => match self.artifact(CONFIG_FILE) {
                Ok(artifact) => self
                    .fetcher
                    .fetch_json(&artifact, Requirement::Optional)
                    .unwrap_or_else(|_| empty()),
                Err(_) => empty(),
            },
        }
    }

    /// Both required files are on disk. Never downloads.
    pub fn ready(&self) -> bool {
        [TOKENIZER_FILE.to_string(), self.onnx_file()]
            .iter()
            .all(|file| self.is_present(file))
    }

    /// Fetch the tokenizer-side files (optional) and then the model (required)
    pub fn preload(&self) -> Result<()> {
        info!("Preloading {}", self.spec.registry_id);
        for file in TOKENIZER_SIDE_FILES {
            self.optional_file(file)?;
        }
        self.onnx_path()?;
        Ok(())
    }

    fn is_present(&self, file: &str) -> bool {
        match &self.spec.local_path {
            Some(dir) => local_file(dir, file).is_file(),
            None => self
                .artifact(file)
                .map(|artifact| self.fetcher.is_cached(&artifact))
                .unwrap_or(false),
        }
    }

    fn required_file(&self, file: &str) -> Result<PathBuf> {
        match &self.spec.local_path {
            Some(dir) => {
                let path = local_file(dir, file);
                if !path.is_file() {
                    return Err(Error::model_not_found(path));
                }
                Ok(path)
            }
            None => self.fetcher.fetch_required(&self.artifact(file)?),
        }
    }

    fn optional_file(&self, file: &str) -> Result<Option<PathBuf>> {
        match &self.spec.local_path {
            Some(dir) => {
                let path = local_file(dir, file);
                if !path.is_file() {
                    debug!("Optional file {:?} not present", path);
                    return Ok(None);
                }
                Ok(Some(path))
            }
            None => self.fetcher.fetch(&self.artifact(file)?, Requirement::Optional),
        }
    }
}

fn local_file(dir: &Path, file: &str) -> PathBuf {
    file.split('/').fold(dir.to_path_buf(), |path, seg| path.join(seg))
}
