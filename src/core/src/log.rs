//! Process-wide diagnostic logging.
//!
//! Installs a `tracing` subscriber once; later calls are no-ops. User-facing
//! progress output does not go through here, see the runtime's progress sink.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

use crate::config::LogLevel;

static INIT: Once = Once::new();

/// Install the default subscriber, reading `RUST_LOG` and falling back to `warn`.
pub fn init() {
    init_with_level(LogLevel::Warn);
}

/// Install the default subscriber with `fallback` used when `RUST_LOG` is unset.
pub fn init_with_level(fallback: LogLevel) {
    INIT.call_once(|| {
        // A host application may already own the global dispatcher.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(fallback.as_str())),
            )
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init();
        init_with_level(LogLevel::Debug);
        tracing::warn!("logging initialized twice without panicking");
    }
}
