//! Tracing setup for tests.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs a test-writer subscriber filtered by `RUST_LOG`, once per
/// process. Does nothing if `RUST_LOG` is unset.
pub fn init_test_logging() {
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

/// Installs a test-writer subscriber at `level` (e.g. `"syncstate_core=debug"`),
/// ignoring `RUST_LOG`. Later calls are no-ops.
pub fn init_test_logging_with(level: &str) {
    tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new(level))
        .try_init()
        .ok();
}
