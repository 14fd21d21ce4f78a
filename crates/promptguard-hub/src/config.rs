//! Hub configuration: cache root, remote host, offline switch and credentials

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Overrides the cache root
pub const CACHE_DIR_ENV: &str = "PROMPT_GUARD_CACHE_DIR";

/// XDG cache base; the cache lives in `$XDG_CACHE_HOME/prompt_guard`
pub const XDG_CACHE_HOME_ENV: &str = "XDG_CACHE_HOME";

/// Disables remote downloads when present (the value is ignored)
pub const OFFLINE_ENV: &str = "PROMPT_GUARD_OFFLINE";

/// Bearer token for gated or private registry entries
pub const TOKEN_ENV: &str = "HF_TOKEN";

/// Directory name used under XDG and home-based cache locations
pub const CACHE_DIR_NAME: &str = "prompt_guard";

/// Default remote registry
pub const DEFAULT_REMOTE_HOST: &str = "https://huggingface.co";

/// Default registry revision
pub const DEFAULT_REVISION: &str = "main";

/// Source of environment variables.
///
/// `Process` reads `std::env` at call time so changes are picked up on every
/// lookup. `Fixed` holds an immutable map and never consults the process.
#[derive(Debug, Clone, Default)]
pub enum Environment {
    #[default]
    Process,
    Fixed(Arc<HashMap<String, String>>),
}

impl Environment {
    /// Build a fixed environment from key/value pairs
    pub fn fixed<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Fixed(Arc::new(
            vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        ))
    }

    /// Empty fixed environment
    pub fn empty() -> Self {
        Self::Fixed(Arc::new(HashMap::new()))
    }

    /// Look up a variable; empty values count as unset
    pub fn var(&self, key: &str) -> Option<String> {
        let value = match self {
            Self::Process => std::env::var(key).ok(),
            Self::Fixed(vars) => vars.get(key).cloned(),
        };
        value.filter(|v| !v.is_empty())
    }

    /// Presence check, value ignored
    pub fn is_set(&self, key: &str) -> bool {
        match self {
            Self::Process => std::env::var_os(key).is_some(),
            Self::Fixed(vars) => vars.contains_key(key),
        }
    }
}

/// Configuration shared by the cache, fetcher and model resolvers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Process-wide cache root override (beats environment variables)
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Registry base URL
    #[serde(default = "default_remote_host")]
    pub remote_host: String,

    /// Allow downloads; `false` behaves like `PROMPT_GUARD_OFFLINE`
    #[serde(default = "default_true")]
    pub allow_remote: bool,

    /// Explicit token; falls back to `HF_TOKEN`
    #[serde(default)]
    pub token: Option<String>,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Whole-request timeout in seconds, body included
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Where environment variables come from
    #[serde(skip)]
    pub env: Environment,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            remote_host: default_remote_host(),
            allow_remote: true,
            token: None,
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            env: Environment::Process,
        }
    }
}

impl HubConfig {
    /// Set the process-wide cache root override
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Set the registry base URL
    pub fn with_remote_host(mut self, host: impl Into<String>) -> Self {
        self.remote_host = host.into();
        self
    }

    /// Enable or disable remote downloads
    pub fn with_allow_remote(mut self, allow: bool) -> Self {
        self.allow_remote = allow;
        self
    }

    /// Set an explicit bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Replace the environment source
    pub fn with_env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    /// Whether downloads are disabled by flag or environment marker
    pub fn is_offline(&self) -> bool {
        !self.allow_remote || self.env.is_set(OFFLINE_ENV)
    }

    /// Token to attach as a bearer credential, if any
    pub fn auth_token(&self) -> Option<String> {
        self.token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| self.env.var(TOKEN_ENV))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

fn default_remote_host() -> String {
    DEFAULT_REMOTE_HOST.to_string()
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_read_timeout() -> u64 {
    600
}

fn global() -> &'static RwLock<HubConfig> {
    static GLOBAL: OnceLock<RwLock<HubConfig>> = OnceLock::new();
    GLOBAL.get_or_init(|| RwLock::new(HubConfig::default()))
}

/// Snapshot of the process-wide configuration
pub fn global_config() -> HubConfig {
    global().read().clone()
}

/// Mutate the process-wide configuration.
///
/// Intended to be called once at startup. Pipelines built before the call keep
/// the snapshot they were constructed with.
pub fn configure<F>(f: F)
where
    F: FnOnce(&mut HubConfig),
{
    f(&mut global().write());
}
