//! Logging setup for DocBuddy
//!
//! Structured logs go to stderr through `tracing-subscriber`. `RUST_LOG`
//! wins over everything; otherwise the CLI verbosity flags pick the
//! level, falling back to `[logging] level` from the config file.

use tracing_subscriber::EnvFilter;

use crate::cli::Verbosity;

/// Filter directive for the given verbosity and configured level
pub fn filter_directive(verbosity: Verbosity, configured: &str) -> String {
    let level = match verbosity {
        Verbosity::Quiet => "error",
        Verbosity::Normal => configured,
        Verbosity::Verbose => "debug",
        Verbosity::VeryVerbose => "trace",
    };

    // Dependencies stay at warn unless asked for explicitly
    format!("warn,docbuddy={}", level)
}

/// Install the global subscriber
///
/// Safe to call more than once; later calls are ignored.
pub fn init(verbosity: Verbosity, configured: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(verbosity, configured)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity == Verbosity::VeryVerbose)
        .with_writer(std::io::stderr)
        .try_init();
}
