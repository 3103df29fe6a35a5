//! Structured logging setup using tracing.
//!
//! Installs a `tracing-subscriber` fmt subscriber filtered by `RUST_LOG`,
//! falling back to the configured level. Output is plain text or JSON.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mssql_connector::error::{ConnectorError, ConnectorResult};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Parse from string value (case-insensitive). Unknown values are text.
    pub fn from_str_value(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl LoggingConfig {
    /// Build from a variable lookup.
    ///
    /// Reads:
    /// - `MSSQL_DEBUG`: truthy value switches the default filter to `debug`
    /// - `MSSQL_LOG_FORMAT`: `json` or `text` (default)
    pub(crate) fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        let debug = lookup("MSSQL_DEBUG").is_some_and(|v| is_truthy(&v));
        Self {
            filter: if debug { "debug" } else { "info" }.to_string(),
            format: lookup("MSSQL_LOG_FORMAT")
                .map(|v| LogFormat::from_str_value(&v))
                .unwrap_or_default(),
        }
    }
}

pub(crate) fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Initialize the global subscriber.
///
/// Fails if a subscriber is already installed or the filter is invalid.
pub fn init(config: &LoggingConfig) -> ConnectorResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| ConnectorError::invalid_configuration(format!("invalid log filter: {e}")))?;

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true).flatten_event(true))
            .with(filter)
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .try_init(),
    };
    result.map_err(|e| {
        ConnectorError::invalid_configuration(format!("failed to install log subscriber: {e}"))
    })?;

    tracing::info!(filter = %config.filter, format = ?config.format, "Logging initialized");
    Ok(())
}
