//! CLI configuration

use promptguard_classifiers::ModelOptions;
use promptguard_hub::HubConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Contents of the optional YAML config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Cache, registry and network settings
    #[serde(default)]
    pub hub: HubConfig,

    /// Per-task defaults keyed by task name
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskDefaults>,
}

/// File-level defaults for one task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskDefaults {
    /// Registry id overriding the task's built-in model
    #[serde(default)]
    pub model: Option<String>,

    #[serde(flatten)]
    pub options: ModelOptions,
}

/// Flag values that override the file
#[derive(Debug, Clone, Default)]
pub struct HubOverrides {
    pub cache_dir: Option<PathBuf>,
    pub offline: bool,
}

impl CliConfig {
    /// Load configuration from an optional file, then apply flag overrides.
    ///
    /// An explicitly named file must exist.
    pub fn load(path: Option<&Path>, overrides: &HubOverrides) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e)
                })?;
                Self::from_yaml(&content)?
            }
            None => Self::default(),
        };

        config.apply(overrides);
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    fn apply(&mut self, overrides: &HubOverrides) {
        if let Some(dir) = &overrides.cache_dir {
            self.hub.cache_dir = Some(dir.clone());
        }
        if overrides.offline {
            self.hub.allow_remote = false;
        }
    }

    /// Model id and options for `task`: flags first, then the file
    pub fn resolve(
        &self,
        task: &str,
        model: Option<String>,
        flags: ModelOptions,
    ) -> (Option<String>, ModelOptions) {
        match self.tasks.get(task) {
            Some(defaults) => (
                model.or_else(|| defaults.model.clone()),
                flags.merge(&defaults.options),
            ),
            None => (model, flags),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptguard_classifiers::Dtype;

    const SAMPLE: &str = r#"
hub:
  cache_dir: /var/cache/models
  remote_host: https://mirror.internal
  read_timeout_secs: 120
tasks:
  prompt-guard:
    model: acme/guard-small
    dtype: q8
    threshold: 0.7
"#;

    #[test]
    fn test_parse_yaml() {
        let config = CliConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.hub.cache_dir, Some(PathBuf::from("/var/cache/models")));
        assert_eq!(config.hub.remote_host, "https://mirror.internal");
        assert_eq!(config.hub.read_timeout_secs, 120);
        assert_eq!(config.hub.connect_timeout_secs, 30);
        assert!(config.hub.allow_remote);

        let guard = &config.tasks["prompt-guard"];
        assert_eq!(guard.model.as_deref(), Some("acme/guard-small"));
        assert_eq!(guard.options.dtype, Some(Dtype::Q8));
        assert_eq!(guard.options.threshold, Some(0.7));
    }

    #[test]
    fn test_empty_file_is_default() {
        let config = CliConfig::from_yaml("  \n").unwrap();
        assert!(config.tasks.is_empty());
        assert_eq!(config.hub.remote_host, "https://huggingface.co");
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("promptguard.yaml");
        std::fs::write(&path, SAMPLE).unwrap();

        let overrides = HubOverrides {
            cache_dir: Some(PathBuf::from("/tmp/override")),
            offline: true,
        };
        let config = CliConfig::load(Some(&path), &overrides).unwrap();
        assert_eq!(config.hub.cache_dir, Some(PathBuf::from("/tmp/override")));
        assert!(!config.hub.allow_remote);

        let (model, options) = config.resolve(
            "prompt-guard",
            None,
            ModelOptions::default().with_threshold(0.9),
        );
        assert_eq!(model.as_deref(), Some("acme/guard-small"));
        assert_eq!(options.threshold, Some(0.9));
        assert_eq!(options.dtype, Some(Dtype::Q8));

        let (model, options) = config.resolve("pii-classifier", Some("me/pii".into()), ModelOptions::default());
        assert_eq!(model.as_deref(), Some("me/pii"));
        assert_eq!(options, ModelOptions::default());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("absent.yaml");
        assert!(CliConfig::load(Some(&path), &HubOverrides::default()).is_err());
    }
}
