//! Process-wide tracing setup.
//!
//! The level filter sits behind a reload layer so the `[logging]` level can
//! be changed while a controller runs.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

use crate::{ConfigError, LoggingConfig};

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Install the global subscriber at `info`.
pub fn init_tracing() -> bool {
    init_tracing_with_level("info")
}

/// Install the global subscriber filtered at `level`.
///
/// A parseable `RUST_LOG` takes precedence over `level`. Returns `false` when
/// a global subscriber was already installed, in which case the level cannot
/// be reloaded through this module.
pub fn init_tracing_with_level(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let (filter, handle) = reload::Layer::new(filter);

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok();
    if installed {
        let _ = FILTER_HANDLE.set(handle);
        tracing::debug!(level, "Tracing initialized");
    }
    installed
}

/// Install the global subscriber from the `[logging]` section.
pub fn init_from_config(logging: &LoggingConfig) -> bool {
    init_tracing_with_level(&logging.level)
}

/// Replace the active level filter.
///
/// Fails if `level` is not a valid filter directive or if tracing was not
/// initialized by [`init_tracing_with_level`].
pub fn apply_logging_level(level: &str) -> Result<(), ConfigError> {
    let filter = EnvFilter::try_new(level)
        .map_err(|err| ConfigError::Logging(format!("invalid level {level:?}: {err}")))?;
    let handle = FILTER_HANDLE
        .get()
        .ok_or_else(|| ConfigError::Logging("tracing is not initialized".into()))?;
    handle
        .reload(filter)
        .map_err(|err| ConfigError::Logging(err.to_string()))?;
    tracing::info!(level, "Logging level changed");
    Ok(())
}
