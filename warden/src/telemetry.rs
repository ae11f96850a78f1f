//! Tracing subscriber setup.
//!
//! Libraries only emit `tracing` events; the process that embeds warden
//! decides whether to install a subscriber. [`init_tracing`] is the
//! ready-made one: an `EnvFilter` from `RUST_LOG` and a plain or JSON
//! formatter picked by `WARDEN_LOG_FORMAT`.

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "plain" | "text" | "pretty" => Some(LogFormat::Plain),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is unset or invalid.
    pub default_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Plain,
            default_filter: "info".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Read `WARDEN_LOG_FORMAT` (`plain` or `json`). Unknown values keep
    /// the plain formatter.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let format = lookup("WARDEN_LOG_FORMAT")
            .and_then(|v| LogFormat::parse(&v))
            .unwrap_or_default();
        Self {
            format,
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_filter))
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to init subscriber: {0}")]
    Init(String),
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let registry = tracing_subscriber::registry().with(config.env_filter());
    let result = match config.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Plain => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    result.map_err(|e| TelemetryError::Init(e.to_string()))?;

    tracing::info!(format = ?config.format, "Telemetry initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_lookup() {
        let json = TelemetryConfig::from_lookup(|k| {
            (k == "WARDEN_LOG_FORMAT").then(|| "JSON".to_string())
        });
        assert_eq!(json.format, LogFormat::Json);

        let unknown = TelemetryConfig::from_lookup(|_| Some("xml".to_string()));
        assert_eq!(unknown.format, LogFormat::Plain);

        let unset = TelemetryConfig::from_lookup(|_| None);
        assert_eq!(unset, TelemetryConfig::default());
        assert_eq!(unset.default_filter, "info");
    }

    #[test]
    fn test_second_init_fails() {
        let config = TelemetryConfig::default().with_default_filter("warn");
        // Another test in this binary may have installed one already.
        let _ = init_tracing(&config);
        assert!(matches!(
            init_tracing(&config),
            Err(TelemetryError::Init(_))
        ));
    }
}
