// crates/observability/src/lib.rs
//! Process-wide tracing setup.

use codescan_core::config::{LogFormat, LoggingConfig};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Filter used when the configured level does not parse.
const FALLBACK_FILTER: &str = "info";

/// Build the filter: `RUST_LOG` wins over the configured level.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new(FALLBACK_FILTER))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), TryInitError> {
    let filter = env_filter(config);
    match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_current_span(false)
            .with_env_filter(filter)
            .finish()
            .try_init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .compact()
            .with_target(true)
            .with_env_filter(filter)
            .finish()
            .try_init(),
    }
}
