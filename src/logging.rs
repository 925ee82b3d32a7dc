//! Log subscriber installation.
//!
//! Every module logs through `tracing` macros with structured fields. This
//! installs the process-wide subscriber once at startup; the filter comes
//! from `RUST_LOG` and defaults to `info`.

use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

/// Installs the global subscriber. Later calls are no-ops.
pub fn init(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match format {
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };

    if installed.is_ok() {
        tracing::debug!(?format, "logging initialised");
    }
}
