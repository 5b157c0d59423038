//! Out-of-process credential helpers.
//!
//! Each platform ships a fixed set of helpers, chosen at build time. A helper
//! named `<name>` is the program `docker-credential-<name>`: it is run with the
//! argument `get`, receives the registry URL on stdin and replies with
//! `{"ServerURL": .., "Username": .., "Secret": ..}` on stdout.

use std::collections::HashMap;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;

use kpm_core::error::{KpmError, Result};
use serde::Deserialize;

/// Username and password vended by a helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperCredentials {
    pub username: String,
    pub password: String,
}

/// A source of registry credentials.
pub trait CredentialHelper: Send + Sync {
    /// Look up credentials for `registry_url`.
    fn get(&self, registry_url: &str) -> Result<HelperCredentials>;
}

/// Helper backed by an external `docker-credential-*` program.
#[derive(Debug, Clone)]
pub struct ProgramHelper {
    name: String,
    program: String,
}

impl ProgramHelper {
    /// Helper `name`, run as `docker-credential-<name>` from `PATH`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let program = format!("docker-credential-{}", name);
        Self { name, program }
    }

    /// Helper `name` run from an explicit program path.
    pub fn with_program(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
        }
    }

    fn failure(&self, message: impl Into<String>) -> KpmError {
        KpmError::HelperFailure {
            helper: self.name.clone(),
            message: message.into(),
        }
    }
}

#[derive(Deserialize)]
struct HelperReply {
    #[serde(rename = "Username")]
    username: String,
    #[serde(rename = "Secret")]
    secret: String,
}

impl CredentialHelper for ProgramHelper {
    fn get(&self, registry_url: &str) -> Result<HelperCredentials> {
        tracing::debug!(helper = %self.name, registry = %registry_url, "Invoking credential helper");

        let mut child = Command::new(&self.program)
            .arg("get")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.failure(format!("cannot run {}: {}", self.program, e)))?;

        // Closing stdin on drop gives the helper EOF.
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(registry_url.as_bytes()),
            None => Ok(()),
        };

        let output = child
            .wait_with_output()
            .map_err(|e| self.failure(format!("helper did not finish: {}", e)))?;

        if let Err(e) = written {
            // A helper that quit early usually said why.
            let message = helper_message(&output.stdout, &output.stderr);
            return Err(self.failure(if message.is_empty() {
                format!("cannot write to helper: {}", e)
            } else {
                message
            }));
        }

        if !output.status.success() {
            return Err(self.failure(helper_message(&output.stdout, &output.stderr)));
        }

        parse_reply(&output.stdout).map_err(|e| self.failure(e))
    }
}

/// Trimmed stdout, or stderr when stdout is empty.
fn helper_message(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    if stdout.trim().is_empty() {
        String::from_utf8_lossy(stderr).trim().to_string()
    } else {
        stdout.trim().to_string()
    }
}

fn parse_reply(stdout: &[u8]) -> std::result::Result<HelperCredentials, String> {
    let reply: HelperReply =
        serde_json::from_slice(stdout).map_err(|e| format!("invalid helper reply: {}", e))?;
    Ok(HelperCredentials {
        username: reply.username,
        password: reply.secret,
    })
}

/// Helper names available on this platform.
#[cfg(target_os = "macos")]
fn platform_helper_names() -> &'static [&'static str] {
    &["osxkeychain"]
}

#[cfg(target_os = "linux")]
fn platform_helper_names() -> &'static [&'static str] {
    &["secretservice", "pass"]
}

#[cfg(windows)]
fn platform_helper_names() -> &'static [&'static str] {
    &["wincred"]
}

#[cfg(not(any(target_os = "macos", target_os = "linux", windows)))]
fn platform_helper_names() -> &'static [&'static str] {
    &[]
}

/// Name → helper table.
#[derive(Clone, Default)]
pub struct HelperRegistry {
    helpers: HashMap<String, Arc<dyn CredentialHelper>>,
}

impl HelperRegistry {
    /// Registry holding this platform's helpers.
    pub fn platform() -> Self {
        let mut registry = Self::empty();
        for name in platform_helper_names() {
            registry.register(*name, Arc::new(ProgramHelper::new(*name)));
        }
        registry
    }

    /// Registry with no helpers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add or replace a helper.
    pub fn register(&mut self, name: impl Into<String>, helper: Arc<dyn CredentialHelper>) {
        self.helpers.insert(name.into(), helper);
    }

    /// Look up a helper by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn CredentialHelper>> {
        self.helpers
            .get(name)
            .cloned()
            .ok_or_else(|| KpmError::UnknownHelper(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.helpers.keys().map(String::as_str).collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for HelperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HelperRegistry")
            .field("helpers", &self.names())
            .finish()
    }
}
