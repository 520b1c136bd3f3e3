//! Shared test helpers

use tracing_subscriber::EnvFilter;

/// Route `tracing` output to the test harness, filtered by `RUST_LOG`
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
