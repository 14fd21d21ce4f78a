//! Cache root resolution and on-disk lookups

use crate::config::{HubConfig, CACHE_DIR_ENV, CACHE_DIR_NAME, DEFAULT_REVISION, XDG_CACHE_HOME_ENV};
use promptguard_core::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// One remote file: `{registry_id}` at `{revision}`, path `{relative_path}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactRef {
    registry_id: String,
    relative_path: String,
    revision: String,
}

impl ArtifactRef {
    /// Create a reference, rejecting identifiers that could escape the cache root
    pub fn new(
        registry_id: impl Into<String>,
        relative_path: impl Into<String>,
        revision: impl Into<String>,
    ) -> Result<Self> {
        let registry_id = registry_id.into();
        let relative_path = relative_path.into();
        let revision = revision.into();

        validate_segments("registry id", &registry_id)?;
        validate_segments("artifact path", &relative_path)?;
        if revision.is_empty() || revision.contains("..") {
            return Err(Error::config(format!("invalid revision '{}'", revision)));
        }

        Ok(Self {
            registry_id,
            relative_path,
            revision,
        })
    }

    /// Reference on the default `main` revision
    pub fn on_main(registry_id: impl Into<String>, relative_path: impl Into<String>) -> Result<Self> {
        Self::new(registry_id, relative_path, DEFAULT_REVISION)
    }

    pub fn registry_id(&self) -> &str {
        &self.registry_id
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry_id, self.relative_path)
    }
}

fn validate_segments(what: &str, value: &str) -> Result<()> {
    let bad = value.is_empty()
        || value.starts_with('/')
        || value.contains('\\')
        || value
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(Error::config(format!("invalid {} '{}'", what, value)));
    }
    Ok(())
}

/// Resolves the cache root and answers existence queries. No network I/O.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    config: HubConfig,
}

impl ArtifactCache {
    pub fn new(config: HubConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Resolve the cache root.
    ///
    /// Precedence: `explicit`, then `HubConfig::cache_dir`, then
    /// `PROMPT_GUARD_CACHE_DIR`, then `$XDG_CACHE_HOME/prompt_guard`, then
    /// `~/.cache/prompt_guard`. Environment variables are read on every call.
    pub fn resolve_root(&self, explicit: Option<&Path>) -> PathBuf {
        if let Some(dir) = explicit {
            return dir.to_path_buf();
        }
        if let Some(dir) = &self.config.cache_dir {
            return dir.clone();
        }
        let env = &self.config.env;
        if let Some(dir) = env.var(CACHE_DIR_ENV) {
            return PathBuf::from(dir);
        }
        if let Some(base) = env.var(XDG_CACHE_HOME_ENV) {
            return PathBuf::from(base).join(CACHE_DIR_NAME);
        }
        home_cache_dir()
    }

    /// `{root}/{registry_id}/{relative_path}`
    pub fn path_for(&self, artifact: &ArtifactRef, root: &Path) -> PathBuf {
        let mut path = root.join(artifact.registry_id());
        for segment in artifact.relative_path().split('/') {
            path.push(segment);
        }
        path
    }

    /// Whether the artifact is present under `root`
    pub fn exists(&self, artifact: &ArtifactRef, root: &Path) -> bool {
        self.path_for(artifact, root).is_file()
    }
}

/// `~/.cache/prompt_guard`, or a relative `.cache/prompt_guard` without a home
pub fn home_cache_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cache")
        .join(CACHE_DIR_NAME)
}
