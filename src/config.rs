//! Configuration Management
//!
//! Persistent settings for vmsnap, stored as JSON in the user config
//! directory. Command-line values take precedence over the file, which takes
//! precedence over built-in defaults.

use crate::correlate::{EngineSettings, DEFAULT_PRELOAD_CONCURRENCY, DEFAULT_SHARD_SIZE};
use crate::resource::{DEFAULT_CACHE_TTL, DEFAULT_CONCURRENCY, DEFAULT_STORAGE_NAMESPACE};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// User configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// API server base URL
    #[serde(default)]
    pub server: Option<String>,
    /// File holding a bearer token
    #[serde(default)]
    pub token_file: Option<PathBuf>,
    /// CA bundle for the API server certificate
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
    /// Namespace of the storage layer's resources
    #[serde(default)]
    pub storage_namespace: Option<String>,
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,
    #[serde(default)]
    pub batch_concurrency: Option<usize>,
    #[serde(default)]
    pub preload_concurrency: Option<usize>,
    #[serde(default)]
    pub wide_concurrency: Option<usize>,
    #[serde(default)]
    pub shard_size: Option<usize>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    /// Get the default config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("vmsnap").join("config.json"))
    }

    /// Load configuration from the default location.
    ///
    /// A missing or unreadable file yields the defaults.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        Self::load_from(&path).unwrap_or_else(|e| {
            tracing::warn!("Ignoring config file: {:#}", e);
            Self::default()
        })
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get effective server (CLI > config)
    pub fn effective_server(&self, cli: Option<&str>) -> Option<String> {
        cli.map(str::to_string)
            .or_else(|| self.server.clone())
            .filter(|s| !s.is_empty())
    }

    /// Get effective storage namespace (CLI > config > default)
    pub fn effective_storage_namespace(&self, cli: Option<&str>) -> String {
        cli.map(str::to_string)
            .or_else(|| self.storage_namespace.clone())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_STORAGE_NAMESPACE.to_string())
    }

    /// Get effective request timeout (CLI > config > default)
    pub fn effective_timeout(&self, cli: Option<u64>) -> Duration {
        cli.or(self.request_timeout_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Engine tunables, with zero values replaced by defaults
    pub fn engine_settings(&self, storage_namespace: String) -> EngineSettings {
        let positive = |value: Option<usize>, default: usize| value.filter(|v| *v > 0).unwrap_or(default);

        EngineSettings {
            cache_ttl: self
                .cache_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CACHE_TTL),
            batch_concurrency: positive(self.batch_concurrency, DEFAULT_CONCURRENCY),
            preload_concurrency: positive(self.preload_concurrency, DEFAULT_PRELOAD_CONCURRENCY),
            wide_concurrency: positive(self.wide_concurrency, DEFAULT_CONCURRENCY),
            shard_size: positive(self.shard_size, DEFAULT_SHARD_SIZE),
            storage_namespace,
        }
    }
}
