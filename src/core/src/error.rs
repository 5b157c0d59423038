use std::path::PathBuf;

use thiserror::Error;

/// KPM error types
#[derive(Error, Debug)]
pub enum KpmError {
    /// Home directory expansion or working-directory lookup failed
    #[error("Path error: {0}")]
    PathError(String),

    /// Credential configuration file does not exist or cannot be read
    #[error("Credential configuration not found: {path}")]
    ConfigMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Credential configuration file is not valid JSON of the expected shape
    #[error("Malformed credential configuration {path}: {message}")]
    ConfigMalformed { path: PathBuf, message: String },

    /// The configuration has no `auths` mapping at all
    #[error("No credentials configured")]
    NoCredentials,

    /// `auths` exists but has no entry for this registry
    #[error("No credentials for registry {0}")]
    NoCredentialsForRegistry(String),

    /// Registry entry has no inline auth and no credential store is set
    #[error("No auth token for registry {0}")]
    NoAuthToken(String),

    /// Credential store names a helper not available on this platform
    #[error("Unknown credential helper: {0}")]
    UnknownHelper(String),

    /// A credential helper ran but could not vend credentials
    #[error("Credential helper {helper} failed: {message}")]
    HelperFailure { helper: String, message: String },

    /// The archive walk hit an unreadable file
    #[error("Failed to read {path} while building archive: {source}")]
    ArchiveReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The image daemon reported an error frame or the transport failed
    #[error("Daemon error: {0}")]
    DaemonError(String),

    /// A package name or version failed validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Operation aborted through its cancellation scope
    #[error("Operation cancelled")]
    Cancelled,

    /// Image operation state machine received an illegal transition
    #[error("Invalid operation state: {0}")]
    InvalidState(String),

    /// Parameter tree lookup failed
    #[error("Parameter error: {0}")]
    ParamError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for KpmError {
    fn from(err: serde_json::Error) -> Self {
        KpmError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for KpmError {
    fn from(err: serde_yaml::Error) -> Self {
        KpmError::SerializationError(err.to_string())
    }
}

/// Result type alias for KPM operations
pub type Result<T> = std::result::Result<T, KpmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_error_display() {
        let error = KpmError::PathError("cannot determine home directory".to_string());
        assert_eq!(
            error.to_string(),
            "Path error: cannot determine home directory"
        );
    }

    #[test]
    fn test_config_missing_display() {
        let error = KpmError::ConfigMissing {
            path: PathBuf::from("/home/u/.docker/config.json"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        assert_eq!(
            error.to_string(),
            "Credential configuration not found: /home/u/.docker/config.json"
        );
    }

    #[test]
    fn test_credential_errors_display() {
        assert_eq!(KpmError::NoCredentials.to_string(), "No credentials configured");
        assert_eq!(
            KpmError::NoCredentialsForRegistry("ghcr.io".to_string()).to_string(),
            "No credentials for registry ghcr.io"
        );
        assert_eq!(
            KpmError::NoAuthToken("ghcr.io".to_string()).to_string(),
            "No auth token for registry ghcr.io"
        );
        assert_eq!(
            KpmError::UnknownHelper("osxkeychain".to_string()).to_string(),
            "Unknown credential helper: osxkeychain"
        );
    }

    #[test]
    fn test_helper_failure_display() {
        let error = KpmError::HelperFailure {
            helper: "pass".to_string(),
            message: "credentials not found in native keychain".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Credential helper pass failed: credentials not found in native keychain"
        );
    }

    #[test]
    fn test_daemon_error_display() {
        let error = KpmError::DaemonError("pull access denied".to_string());
        assert_eq!(error.to_string(), "Daemon error: pull access denied");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let kpm_error: KpmError = io_error.into();
        assert!(matches!(kpm_error, KpmError::IoError(_)));
        assert!(kpm_error.to_string().contains("file not found"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ bad");
        let kpm_error: KpmError = result.unwrap_err().into();
        assert!(matches!(kpm_error, KpmError::SerializationError(_)));
    }

    #[test]
    fn test_serde_yaml_error_conversion() {
        let result: std::result::Result<serde_yaml::Value, _> =
            serde_yaml::from_str("invalid: yaml: content:");
        let kpm_error: KpmError = result.unwrap_err().into();
        assert!(matches!(kpm_error, KpmError::SerializationError(_)));
    }

    #[test]
    fn test_error_is_debug() {
        let error = KpmError::Cancelled;
        let debug_str = format!("{:?}", error);
        assert!(debug_str.contains("Cancelled"));
    }
}
