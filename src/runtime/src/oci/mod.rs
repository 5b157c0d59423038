//! Package image artifacts and registry credentials.
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ config.json  │──▶│  credential  │──▶│ X-Registry-  │
//! │ (auths/store)│   │   helpers    │   │    Auth      │
//! └──────────────┘   └──────────────┘   └──────────────┘
//!
//! ┌──────────────┐   ┌──────────────┐
//! │  Dockerfile  │──▶│ build context│──▶ daemon build
//! │ + source dir │   │    (tar)     │
//! └──────────────┘   └──────────────┘
//! ```

pub mod archive;
pub mod config;
pub mod credentials;
pub mod dockerfile;
pub mod helpers;
pub mod reference;

pub use archive::{build_tar, ArchiveBuilder, VirtualEntry};
pub use config::{load_config, AuthEntry, ConfigStore, DockerConfig};
pub use credentials::{credentials_for, AuthToken, CredentialResolver, EncodedAuth};
pub use dockerfile::{package_dockerfile, MANIFEST_NAME};
pub use helpers::{CredentialHelper, HelperCredentials, HelperRegistry, ProgramHelper};
pub use reference::{tag_of, ImageTag};
