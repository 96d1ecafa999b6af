//! Tracing subscriber setup.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use txguard_types::{LogConfig, Result, TxGuardError};

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over [`LogConfig::filter`]. Returns `false`
/// if a subscriber was already installed, in which case nothing changes.
///
/// # Errors
/// Returns [`TxGuardError::Configuration`] if the filter directive does not
/// parse.
pub fn init_tracing(config: &LogConfig) -> Result<bool> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| TxGuardError::Configuration(format!("invalid log filter: {e}")))?;

    let installed = if config.json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true);
        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()
            .is_ok()
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_ansi(true);
        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()
            .is_ok()
    };

    if installed {
        tracing::info!(
            filter = %config.filter,
            json = config.json,
            version = txguard_types::constants::VERSION,
            "Tracing initialized"
        );
    }
    Ok(installed)
}
