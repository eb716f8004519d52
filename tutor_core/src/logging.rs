//! Logging infrastructure for Externat.
//!
//! Stdout belongs to the session output the user reads and pipes, so all
//! diagnostics go to stderr.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging with sensible defaults
///
/// Default level is INFO; override with the RUST_LOG env var, e.g.
/// `RUST_LOG=tutor_core=debug` to trace placement and case selection.
pub fn init() {
    init_with_filter("info")
}

/// Initialize logging with specific filter directives
pub fn init_with_filter(directives: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}
