//! KPM Core - Foundational Types
//!
//! Errors, package identity and validation, path resolution, configuration
//! and logging shared by the KPM artifact pipeline.

pub mod config;
pub mod error;
pub mod log;
pub mod package;
pub mod params;
pub mod path;
pub mod validate;

// Re-export commonly used types
pub use config::{KpmConfig, LogLevel, DEFAULT_DOCKER_HOST, DEFAULT_REGISTRY};
pub use error::{KpmError, Result};
pub use package::PackageId;
pub use params::Node;
pub use validate::{full_name, validate_name, validate_version};

/// KPM version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
