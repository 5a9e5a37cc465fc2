//! `tracing` + `tracing-subscriber` setup (spec §6 `logging.level`),
//! grounded on `infra-common::logging::setup::{LoggingConfig,
//! setup_logging}`.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    pub app_name: String,
    pub file_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { level: Level::INFO, app_name: "sipswitch".to_string(), file_info: false }
    }
}

impl LoggingConfig {
    pub fn new(level: Level, app_name: impl Into<String>) -> Self {
        LoggingConfig { level, app_name: app_name.into(), ..Default::default() }
    }

    /// Parses the `logging.level` config string (`debug` / `info` /
    /// `warn` / `error`) into a `tracing::Level`, defaulting to `INFO`
    /// on anything unrecognized rather than failing startup over it.
    pub fn level_from_str(value: &str) -> Level {
        Level::from_str(value).unwrap_or(Level::INFO)
    }
}

/// Installs a global `tracing` subscriber. Call once, at process
/// startup; a second call returns an error rather than panicking.
pub fn setup_logging(config: LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_file(config.file_info)
        .with_line_number(config.file_info)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Internal(format!("failed to install tracing subscriber: {e}")))
}
