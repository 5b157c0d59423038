use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{KpmError, Result};

/// Registry key used by the public hub in `~/.docker/config.json`.
pub const DEFAULT_REGISTRY: &str = "https://index.docker.io/v1/";

/// Default daemon endpoint on this platform.
#[cfg(not(windows))]
pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";
#[cfg(windows)]
pub const DEFAULT_DOCKER_HOST: &str = "npipe:////./pipe/docker_engine";

/// KPM pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KpmConfig {
    /// Registry URL used for credential lookup
    pub registry: String,

    /// Optional repository prefix for image tags
    pub repository: Option<String>,

    /// Image daemon endpoint (`unix://`, `tcp://`, `npipe://`)
    pub docker_host: String,

    /// Directory holding `config.json` (None = `~/.docker`)
    pub docker_config: Option<PathBuf>,

    /// Fallback log level when `RUST_LOG` is unset
    pub log_level: LogLevel,
}

impl Default for KpmConfig {
    fn default() -> Self {
        Self {
            registry: DEFAULT_REGISTRY.to_string(),
            repository: None,
            docker_host: DEFAULT_DOCKER_HOST.to_string(),
            docker_config: None,
            log_level: LogLevel::Warn,
        }
    }
}

impl KpmConfig {
    /// Load a YAML config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            KpmError::PathError(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Ok(serde_yaml::from_str(&data)?)
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay values from an environment-like lookup.
    ///
    /// Recognized keys: `KPM_REGISTRY`, `KPM_REPOSITORY`, `DOCKER_HOST`,
    /// `DOCKER_CONFIG`. Empty values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("KPM_REGISTRY") {
            self.registry = v;
        }
        if let Some(v) = get("KPM_REPOSITORY") {
            self.repository = Some(v);
        }
        if let Some(v) = get("DOCKER_HOST") {
            self.docker_host = v;
        }
        if let Some(v) = get("DOCKER_CONFIG") {
            self.docker_config = Some(PathBuf::from(v));
        }
        self
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
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
