//! Daemon API version negotiation.

use std::fmt;
use std::str::FromStr;

use kpm_core::error::{KpmError, Result};
use serde::Deserialize;

/// Highest API version this client speaks.
pub const CLIENT_MAX_VERSION: ApiVersion = ApiVersion::new(1, 41);

/// Version assumed when the daemon does not report one.
pub const FALLBACK_VERSION: ApiVersion = ApiVersion::new(1, 24);

/// A `MAJOR.MINOR` API version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApiVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// URL path prefix, e.g. `/v1.41`.
    pub fn path_prefix(&self) -> String {
        format!("/v{}", self)
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ApiVersion {
    type Err = KpmError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || KpmError::DaemonError(format!("invalid API version '{}'", s));
        let (major, minor) = s.trim().split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

/// Subset of the daemon's `/version` reply.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DaemonVersion {
    #[serde(rename = "ApiVersion", default)]
    pub api_version: Option<String>,
    #[serde(rename = "MinAPIVersion", default)]
    pub min_api_version: Option<String>,
    #[serde(rename = "Version", default)]
    pub version: Option<String>,
}

/// Pick the version to use with a daemon: the lower of ours and theirs.
pub fn negotiate(daemon: &DaemonVersion) -> Result<ApiVersion> {
    let server = match daemon.api_version.as_deref().filter(|v| !v.is_empty()) {
        Some(v) => v.parse()?,
        None => FALLBACK_VERSION,
    };
    Ok(server.min(CLIENT_MAX_VERSION))
}
