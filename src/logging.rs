//! Diagnostic logging setup for the binary.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable with a filter directive, e.g. `treepass=debug`.
pub const LOG_ENV: &str = "TREEPASS_LOG";

/// Filter directive from `TREEPASS_LOG`, then `RUST_LOG`, then the default.
pub fn filter_directive(verbose: bool) -> String {
    std::env::var(LOG_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| if verbose { "debug" } else { "warn" }.to_string())
}

/// Install a compact stderr subscriber. Does nothing if one is installed.
pub fn init(verbose: bool) {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new(filter_directive(verbose)))
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init();
}
