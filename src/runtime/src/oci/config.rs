//! Host credential configuration (`~/.docker/config.json`).
//!
//! Read-only: KPM never writes this file back.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use kpm_core::error::{KpmError, Result};
use serde::Deserialize;

/// Per-registry record under `auths`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AuthEntry {
    /// base64 of `user:pass`
    #[serde(default)]
    pub auth: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Parsed credential configuration.
///
/// `auths` stays an `Option` so "no mapping at all" can be told apart from
/// "mapping without this registry".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DockerConfig {
    #[serde(default)]
    pub auths: Option<HashMap<String, AuthEntry>>,
    #[serde(default, rename = "credsStore")]
    pub creds_store: Option<String>,
}

impl DockerConfig {
    /// Parse a config document. Unknown fields are ignored.
    pub fn parse(data: &str, origin: &Path) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| KpmError::ConfigMalformed {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Locates and loads the credential configuration.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Store at `~/.docker/config.json`, or `$DOCKER_CONFIG/config.json` when set.
    pub fn default_path() -> Result<Self> {
        let dir = std::env::var_os("DOCKER_CONFIG")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self::from_dir(dir)
    }

    /// Store inside `dir`, falling back to `~/.docker` when `dir` is None.
    pub fn from_dir(dir: Option<PathBuf>) -> Result<Self> {
        let dir = match dir {
            Some(d) => d,
            None => dirs::home_dir()
                .ok_or_else(|| {
                    KpmError::PathError(
                        "Cannot determine home directory for credential configuration"
                            .to_string(),
                    )
                })?
                .join(".docker"),
        };
        Ok(Self {
            path: dir.join("config.json"),
        })
    }

    /// Store at an explicit file path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the configuration file.
    pub fn load(&self) -> Result<DockerConfig> {
        let data =
            std::fs::read_to_string(&self.path).map_err(|source| KpmError::ConfigMissing {
                path: self.path.clone(),
                source,
            })?;
        let config = DockerConfig::parse(&data, &self.path)?;

        tracing::debug!(
            path = %self.path.display(),
            registries = config.auths.as_ref().map_or(0, |a| a.len()),
            creds_store = ?config.creds_store,
            "Loaded credential configuration"
        );

        Ok(config)
    }
}

/// Load the credential configuration from its default location.
pub fn load_config() -> Result<DockerConfig> {
    ConfigStore::default_path()?.load()
}
