//! Diagnostic logging to stderr.
//!
//! Progress and summaries go to stdout with `println!`; tracing output is
//! for diagnostics only and stays quiet unless asked for.

use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

/// Default filter: warnings only, or debug for this crate when verbose
pub fn default_directive(verbose: bool) -> String {
    if verbose {
        format!("warn,{}=debug", env!("CARGO_CRATE_NAME"))
    } else {
        "warn".to_string()
    }
}

fn build_env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
///
/// Calling it twice is harmless; the second call is ignored.
pub fn init(verbose: bool) {
    let stderr_layer = fmt::layer()
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr);

    let subscriber = Registry::default()
        .with(build_env_filter(verbose))
        .with(stderr_layer);
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("logging already initialized");
    }
}
