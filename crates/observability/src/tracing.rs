//! Tracing/logging initialization.
//!
//! Every call installs a global `tracing-subscriber` fmt subscriber filtered by
//! `RUST_LOG`. Executor spans carry the run id, so JSON output can be grouped
//! per run downstream.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Output format for log lines.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line, with timestamps.
    #[default]
    Json,
    /// Compact human-readable lines routed through the test harness writer,
    /// so output is captured per test.
    Test,
}

/// Initialize JSON tracing for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    init_with(LogFormat::Json);
}

/// Initialize tracing with an explicit format.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_with(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    match format {
        LogFormat::Json => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_current_span(true)
                .with_timer(tracing_subscriber::fmt::time::SystemTime)
                .with_target(false)
                .try_init();
        }
        LogFormat::Test => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .compact()
                .with_test_writer()
                .with_target(false)
                .try_init();
        }
    }
}
