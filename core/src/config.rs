use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ManifestError, Result};

/// Tool configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Where in-progress manifest lists are kept
    pub storage: StorageLocation,

    /// Registry access settings
    pub registry: RegistryConfig,

    /// Log level
    pub log_level: LogLevel,
}

impl ToolConfig {
    /// Load configuration from a YAML file.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path).map_err(|e| {
            ManifestError::ConfigError(format!(
                "Failed to read config {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&data)
    }

    /// Parse configuration from a YAML document.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let config: ToolConfig = serde_yaml::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.registry.max_concurrent_uploads == 0 {
            return Err(ManifestError::ConfigError(
                "registry.max_concurrent_uploads must be at least 1".to_string(),
            ));
        }
        if self.registry.connect_timeout_secs == 0 || self.registry.request_timeout_secs == 0 {
            return Err(ManifestError::ConfigError(
                "registry timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Base directory of the local transaction store.
///
/// Injected by the caller; nothing in the engine resolves home directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageLocation {
    root: PathBuf,
}

impl StorageLocation {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for StorageLocation {
    fn default() -> Self {
        Self::new(PathBuf::from(".a3s").join("manifests"))
    }
}

/// Registry access configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Pull-through mirrors for the default registry (e.g. "https://mirror.gcr.io")
    pub mirrors: Vec<String>,

    /// Registries reachable over plain HTTP or unverified TLS.
    /// Entries are `host[:port]`, IP addresses, or CIDR blocks.
    pub insecure_registries: Vec<String>,

    /// TCP connect / TLS handshake timeout in seconds
    pub connect_timeout_secs: u64,

    /// Whole-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Upper bound on concurrent blob mounts and manifest pushes
    pub max_concurrent_uploads: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            mirrors: Vec::new(),
            insecure_registries: Vec::new(),
            connect_timeout_secs: 30,
            request_timeout_secs: 120,
            max_concurrent_uploads: 4,
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}
