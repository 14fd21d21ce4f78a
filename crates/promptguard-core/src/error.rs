//! Error types for PromptGuard

use std::path::PathBuf;

/// Result type alias using PromptGuard's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for PromptGuard operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller errors: unknown task, invalid option, malformed identifier
    #[error("configuration error: {0}")]
    Config(String),

    /// A file required under an explicit local model directory is missing
    #[error("model file not found: {}", path.display())]
    ModelNotFound { path: PathBuf },

    /// Remote access is disabled and the artifact is not cached
    #[error("offline mode is enabled and {artifact} is not cached")]
    Offline { artifact: String },

    /// Network failure, HTTP error status or redirect limit during a fetch
    #[error("failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    /// Tokenization or inference failed after the model was loaded
    #[error("inference error: {0}")]
    Inference(String),

    /// Filesystem errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new not-found error for a local model file
    pub fn model_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ModelNotFound { path: path.into() }
    }

    /// Create a new offline error for an artifact description
    pub fn offline(artifact: impl Into<String>) -> Self {
        Self::Offline {
            artifact: artifact.into(),
        }
    }

    /// Create a new download error
    pub fn download(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Download {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a new inference error
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for errors raised while obtaining model artifacts
    pub fn is_acquisition(&self) -> bool {
        matches!(
            self,
            Self::ModelNotFound { .. } | Self::Offline { .. } | Self::Download { .. }
        )
    }

    /// Wrap anything that is not an acquisition error into `Inference`.
    ///
    /// Errors coming out of a tokenizer or inference session go through here so
    /// callers only ever see acquisition errors or `Inference` from `classify`.
    pub fn into_inference(self) -> Self {
        if self.is_acquisition() || matches!(self, Self::Inference(_)) {
            self
        } else {
            Self::Inference(self.to_string())
        }
    }
}
