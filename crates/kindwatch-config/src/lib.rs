//! Configuration and tracing setup for kindwatch controllers.
//!
//! Settings are layered: an optional TOML file first, then environment
//! variables prefixed with `KINDWATCH` using `__` as the section separator,
//! e.g. `KINDWATCH__CONTROLLER__HANDLER_TIMEOUT_MS=5000`.

pub mod observability;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Handlers run unbounded unless a timeout is configured.
const DEFAULT_HANDLER_TIMEOUT_MS: u64 = 0;

/// Errors raised while building or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The layered sources could not be read or merged.
    #[error("config build error: {0}")]
    Build(#[source] config::ConfigError),

    /// The merged sources could not be mapped onto [`KindwatchConfig`].
    #[error("config deserialize error: {0}")]
    Deserialize(#[source] config::ConfigError),

    /// The configuration parsed but failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// Tracing could not be initialized or reconfigured.
    #[error("logging setup error: {0}")]
    Logging(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KindwatchConfig {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl KindwatchConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.controller.name.trim().is_empty() {
            return Err("controller.name must not be empty".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }
}

/// Settings consumed by a running controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Name attached to every log line emitted by the controller.
    #[serde(default = "default_controller_name")]
    pub name: String,

    /// Upper bound for a single handler invocation in milliseconds.
    ///
    /// `0` (the default) disables the bound. When set, a handler still running
    /// after this long is cancelled at its next await point and counted as a
    /// fault.
    #[serde(default = "default_handler_timeout_ms")]
    pub handler_timeout_ms: u64,
}

fn default_controller_name() -> String {
    "controller".into()
}

fn default_handler_timeout_ms() -> u64 {
    DEFAULT_HANDLER_TIMEOUT_MS
}

impl ControllerConfig {
    /// Returns the handler timeout, or `None` when it is disabled.
    #[inline]
    pub fn handler_timeout(&self) -> Option<Duration> {
        match self.handler_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            name: default_controller_name(),
            handler_timeout_ms: default_handler_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::{ConfigError, KindwatchConfig};
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    /// Default file looked up when no explicit path is given.
    pub const DEFAULT_CONFIG_FILE: &str = "kindwatch.toml";

    pub fn load_config(path: Option<&str>) -> Result<KindwatchConfig, ConfigError> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            tracing::debug!(path = %pathbuf.display(), "Loading configuration file");
            builder = builder.add_source(File::from(pathbuf));
        } else {
            tracing::debug!(path = %pathbuf.display(), "Configuration file not found, using defaults");
        }
        // Environment variable overrides, e.g., KINDWATCH__LOGGING__LEVEL=debug
        builder = builder.add_source(
            Environment::with_prefix("KINDWATCH")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder.build().map_err(ConfigError::Build)?;
        let merged: KindwatchConfig = cfg.try_deserialize().map_err(ConfigError::Deserialize)?;
        merged.validate().map_err(ConfigError::Invalid)?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<KindwatchConfig, ConfigError> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}
