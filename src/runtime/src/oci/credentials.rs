//! Registry credential resolution.
//!
//! Turns a registry URL into the encoded auth token the image daemon expects
//! in `X-Registry-Auth`, using inline `auths` entries from the host config or
//! the configured credential helper.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use kpm_core::error::{KpmError, Result};
use serde::Serialize;

use super::config::{ConfigStore, DockerConfig};
use super::helpers::HelperRegistry;

/// Credentials for one registry, as sent to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AuthToken {
    /// Pre-encoded `auth` from the config file
    Inline {
        #[serde(rename = "serverAddress")]
        server_address: String,
        auth: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        email: Option<String>,
    },
    /// Username and password from a credential helper
    Basic {
        #[serde(rename = "serverAddress")]
        server_address: String,
        username: String,
        password: String,
    },
}

impl AuthToken {
    pub fn server_address(&self) -> &str {
        match self {
            AuthToken::Inline { server_address, .. } | AuthToken::Basic { server_address, .. } => {
                server_address
            }
        }
    }

    /// JSON, then URL-safe base64 with padding.
    pub fn encode(&self) -> EncodedAuth {
        // Only strings are serialized, so this cannot fail.
        let json = serde_json::to_vec(self).expect("auth token serializes to JSON");
        EncodedAuth(URL_SAFE.encode(json))
    }
}

/// Encoded token ready for the `X-Registry-Auth` header.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedAuth(String);

impl EncodedAuth {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for EncodedAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncodedAuth(<redacted>)")
    }
}

/// Resolves credentials from the host configuration and helper table.
#[derive(Debug, Clone)]
pub struct CredentialResolver {
    store: ConfigStore,
    helpers: HelperRegistry,
}

impl CredentialResolver {
    pub fn new(store: ConfigStore, helpers: HelperRegistry) -> Self {
        Self { store, helpers }
    }

    /// Resolver over the default config location and this platform's helpers.
    pub fn for_host() -> Result<Self> {
        Ok(Self::new(
            ConfigStore::default_path()?,
            HelperRegistry::platform(),
        ))
    }

    /// Resolve the token for `registry_url`.
    pub fn resolve(&self, registry_url: &str) -> Result<AuthToken> {
        let config = self.store.load()?;
        resolve_from(&config, &self.helpers, registry_url)
    }

    /// Resolve and encode the token for `registry_url`.
    pub fn credentials_for(&self, registry_url: &str) -> Result<EncodedAuth> {
        Ok(self.resolve(registry_url)?.encode())
    }
}

/// Resolve against an already-loaded configuration.
pub fn resolve_from(
    config: &DockerConfig,
    helpers: &HelperRegistry,
    registry_url: &str,
) -> Result<AuthToken> {
    let auths = config.auths.as_ref().ok_or(KpmError::NoCredentials)?;
    let entry = auths
        .get(registry_url)
        .ok_or_else(|| KpmError::NoCredentialsForRegistry(registry_url.to_string()))?;

    if let Some(auth) = &entry.auth {
        tracing::debug!(registry = %registry_url, "Using inline registry auth");
        return Ok(AuthToken::Inline {
            server_address: registry_url.to_string(),
            auth: auth.clone(),
            username: entry.username.clone(),
            email: entry.email.clone(),
        });
    }

    let store_name = config
        .creds_store
        .as_deref()
        .ok_or_else(|| KpmError::NoAuthToken(registry_url.to_string()))?;

    let helper = helpers.get(store_name)?;
    tracing::debug!(registry = %registry_url, helper = %store_name, "Using credential helper");
    let creds = helper.get(registry_url)?;

    Ok(AuthToken::Basic {
        server_address: registry_url.to_string(),
        username: creds.username,
        password: creds.password,
    })
}

/// Encoded token for `registry_url` using the host configuration.
pub fn credentials_for(registry_url: &str) -> Result<EncodedAuth> {
    CredentialResolver::for_host()?.credentials_for(registry_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oci::helpers::{CredentialHelper, HelperCredentials};
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct FixedHelper(&'static str, &'static str);

    impl CredentialHelper for FixedHelper {
        fn get(&self, _registry_url: &str) -> Result<HelperCredentials> {
            Ok(HelperCredentials {
                username: self.0.to_string(),
                password: self.1.to_string(),
            })
        }
    }

    struct LockedHelper;

    impl CredentialHelper for LockedHelper {
        fn get(&self, _registry_url: &str) -> Result<HelperCredentials> {
            Err(KpmError::HelperFailure {
                helper: "locked".to_string(),
                message: "keychain is locked".to_string(),
            })
        }
    }

    fn config(json: &str) -> DockerConfig {
        DockerConfig::parse(json, Path::new("config.json")).unwrap()
    }

    fn helpers_with_fixed() -> HelperRegistry {
        let mut helpers = HelperRegistry::empty();
        helpers.register("fixed", Arc::new(FixedHelper("alice", "pw")));
        helpers
    }

    fn decode(encoded: &EncodedAuth) -> String {
        String::from_utf8(URL_SAFE.decode(encoded.as_str()).unwrap()).unwrap()
    }

    #[test]
    fn test_inline_auth_token() {
        let cfg = config(r#"{"auths":{"r.example":{"auth":"dXNlcjpwdw=="}}}"#);
        let token = resolve_from(&cfg, &HelperRegistry::empty(), "r.example").unwrap();

        let encoded = token.encode();
        assert_eq!(
            decode(&encoded),
            r#"{"serverAddress":"r.example","auth":"dXNlcjpwdw=="}"#
        );
        assert_eq!(
            encoded.as_str(),
            URL_SAFE.encode(r#"{"serverAddress":"r.example","auth":"dXNlcjpwdw=="}"#)
        );
    }

    #[test]
    fn test_inline_auth_carries_username_and_email() {
        let cfg = config(
            r#"{"auths":{"r.example":{"auth":"eA==","username":"u","email":"u@x.io"}}}"#,
        );
        let token = resolve_from(&cfg, &HelperRegistry::empty(), "r.example").unwrap();
        assert_eq!(
            decode(&token.encode()),
            r#"{"serverAddress":"r.example","auth":"eA==","username":"u","email":"u@x.io"}"#
        );
    }

    #[test]
    fn test_inline_auth_independent_of_helpers() {
        let cfg = config(r#"{"auths":{"r.example":{"auth":"eA=="}},"credsStore":"fixed"}"#);
        let with = resolve_from(&cfg, &helpers_with_fixed(), "r.example").unwrap();
        let without = resolve_from(&cfg, &HelperRegistry::empty(), "r.example").unwrap();
        assert_eq!(with, without);
    }

    #[test]
    fn test_no_auths_is_no_credentials() {
        let cfg = config(r#"{"credsStore":"fixed"}"#);
        let err = resolve_from(&cfg, &helpers_with_fixed(), "r.example").unwrap_err();
        assert!(matches!(err, KpmError::NoCredentials));
    }

    #[test]
    fn test_missing_registry() {
        let cfg = config(r#"{"auths":{"other.example":{"auth":"eA=="}}}"#);
        let err = resolve_from(&cfg, &helpers_with_fixed(), "r.example").unwrap_err();
        assert!(matches!(err, KpmError::NoCredentialsForRegistry(ref r) if r == "r.example"));
    }

    #[test]
    fn test_no_inline_and_no_store() {
        let cfg = config(r#"{"auths":{"r.example":{}}}"#);
        let err = resolve_from(&cfg, &helpers_with_fixed(), "r.example").unwrap_err();
        assert!(matches!(err, KpmError::NoAuthToken(_)));
    }

    #[test]
    fn test_helper_token() {
        let cfg = config(r#"{"auths":{"r.example":{}},"credsStore":"fixed"}"#);
        let token = resolve_from(&cfg, &helpers_with_fixed(), "r.example").unwrap();
        assert_eq!(token.server_address(), "r.example");
        assert_eq!(
            decode(&token.encode()),
            r#"{"serverAddress":"r.example","username":"alice","password":"pw"}"#
        );
    }

    #[test]
    fn test_unknown_store() {
        let cfg = config(r#"{"auths":{"r.example":{}},"credsStore":"osxkeychain"}"#);
        let err = resolve_from(&cfg, &helpers_with_fixed(), "r.example").unwrap_err();
        assert!(matches!(err, KpmError::UnknownHelper(ref n) if n == "osxkeychain"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_osxkeychain_unknown_on_linux() {
        let cfg = config(r#"{"auths":{"r.example":{}},"credsStore":"osxkeychain"}"#);
        let err = resolve_from(&cfg, &HelperRegistry::platform(), "r.example").unwrap_err();
        assert!(matches!(err, KpmError::UnknownHelper(_)));
    }

    #[test]
    fn test_helper_failure_propagates() {
        let mut helpers = HelperRegistry::empty();
        helpers.register("locked", Arc::new(LockedHelper));
        let cfg = config(r#"{"auths":{"r.example":{}},"credsStore":"locked"}"#);

        let err = resolve_from(&cfg, &helpers, "r.example").unwrap_err();
        assert!(matches!(err, KpmError::HelperFailure { ref message, .. } if message == "keychain is locked"));
    }

    #[test]
    fn test_resolver_reads_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"auths":{"ghcr.io":{"auth":"eA=="}}}"#).unwrap();

        let resolver = CredentialResolver::new(ConfigStore::new(path), HelperRegistry::empty());
        let encoded = resolver.credentials_for("ghcr.io").unwrap();
        assert_eq!(
            decode(&encoded),
            r#"{"serverAddress":"ghcr.io","auth":"eA=="}"#
        );
    }

    #[test]
    fn test_resolver_missing_config() {
        let dir = TempDir::new().unwrap();
        let resolver = CredentialResolver::new(
            ConfigStore::new(dir.path().join("config.json")),
            HelperRegistry::empty(),
        );
        assert!(matches!(
            resolver.credentials_for("ghcr.io").unwrap_err(),
            KpmError::ConfigMissing { .. }
        ));
    }

    #[test]
    fn test_encoded_auth_debug_redacted() {
        let cfg = config(r#"{"auths":{"r.example":{"auth":"c2VjcmV0"}}}"#);
        let token = resolve_from(&cfg, &HelperRegistry::empty(), "r.example").unwrap();
        assert!(!format!("{:?}", token.encode()).contains("c2VjcmV0"));
    }
}
