//! Diagnostic logging for the `vigil` binary.
//!
//! Logs go to stderr in compact form so command output on stdout stays
//! clean. `VIGIL_LOG` takes precedence over `RUST_LOG`; with neither set only
//! warnings are shown, or debug output when `--verbose` is passed.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_ENV: &str = "VIGIL_LOG";

/// Installs the global subscriber. Calling it twice is a no-op.
pub(crate) fn init(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init()
        .ok();
}
