//! KPM Runtime - package artifact pipeline.
//!
//! Packs a package directory into an image build context, resolves registry
//! credentials from the host configuration, and drives an image daemon to
//! build, push, pull, remove and extract package images.

#![allow(clippy::result_large_err)]

pub mod daemon;
pub mod oci;
pub mod pipeline;

// Re-export common types
pub use daemon::{open_client, DaemonClient, DaemonEndpoint, DeleteOutcome, ProgressSink};
pub use daemon::{ApiVersion, Operation, OperationKind, OperationState};
pub use kpm_core::{KpmError, Result};
pub use oci::{build_tar, ArchiveBuilder, ConfigStore, DockerConfig};
pub use oci::{credentials_for, AuthToken, CredentialResolver, EncodedAuth};
pub use oci::{tag_of, HelperRegistry, ImageTag};
pub use pipeline::Publisher;

/// KPM Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
