//! Logging setup for binaries and tests.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Install a `tracing` subscriber filtered by `RUST_LOG`.
///
/// Falls back to `default_level` when `RUST_LOG` is unset or invalid. Safe to
/// call more than once; an already-installed global subscriber is kept.
pub fn init_logging(default_level: &str) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level));

        if tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init()
            .is_err()
        {
            tracing::debug!("global tracing subscriber already set");
        }
    });
}
