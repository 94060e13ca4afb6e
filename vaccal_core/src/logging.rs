//! Logging setup for vaccal.
//!
//! Diagnostics go to stderr so the schedule printed on stdout can be piped
//! or redirected without log lines mixed in.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Level used by the `vaccal` CLI: only degraded catalogs and corrupt records
pub const DEFAULT_LEVEL: &str = "warn";

/// Install the subscriber at [`DEFAULT_LEVEL`]
pub fn init() {
    init_with_level(DEFAULT_LEVEL)
}

/// Install the subscriber, using `default_level` when `RUST_LOG` is unset
///
/// `RUST_LOG=vaccal_core=debug` shows store loads and writes. An unparsable
/// `default_level` falls back to [`DEFAULT_LEVEL`]. Calling this again after
/// a subscriber is installed does nothing.
pub fn init_with_level(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .try_init();
}

/// Route logs through the test harness at debug level
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("debug"))
        .try_init();
}
