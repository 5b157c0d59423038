//! Image daemon driver.
//!
//! Talks to a Docker-compatible engine over its HTTP API to build, push,
//! pull, remove and extract package images.

pub mod client;
pub mod endpoint;
pub mod progress;
pub mod state;
pub mod version;

pub use client::{open_client, DaemonClient, DeleteOutcome, DEFAULT_CLEANUP_TIMEOUT};
pub use endpoint::DaemonEndpoint;
pub use progress::{FrameDecoder, JsonMessage, ProgressSink};
pub use state::{Operation, OperationKind, OperationState};
pub use version::{negotiate, ApiVersion, DaemonVersion, CLIENT_MAX_VERSION, FALLBACK_VERSION};
