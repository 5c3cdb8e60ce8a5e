//! `tracing-subscriber` setup for applications embedding a session
//!
//! The library itself only emits `tracing` events. Call [`init_logging`] (or
//! [`init_logging_with_config`]) once at startup to see them.

use crate::config::LoggingConfig;
use std::fmt;
use thiserror::Error;
use tracing_subscriber::{fmt as tfmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Error)]
pub enum LoggingError {
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    #[error("Invalid logging configuration: {0}")]
    InvalidConfiguration(String),
}

/// Minimum severity to display
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parse a level name, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscriber options
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub with_timestamp: bool,
    pub with_target: bool,
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_timestamp: true,
            with_target: true,
            json_format: false,
        }
    }
}

impl LogConfig {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    pub fn with_timestamp(mut self, enabled: bool) -> Self {
        self.with_timestamp = enabled;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn json_format(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }
}

impl TryFrom<&LoggingConfig> for LogConfig {
    type Error = LoggingError;

    fn try_from(section: &LoggingConfig) -> Result<Self, Self::Error> {
        let level = LogLevel::parse(&section.level).ok_or_else(|| {
            LoggingError::InvalidConfiguration(format!("unknown level {:?}", section.level))
        })?;

        Ok(LogConfig::new(level)
            .with_timestamp(section.with_timestamp)
            .with_target(section.with_target)
            .json_format(section.json_format))
    }
}

/// Initialize logging with the default configuration
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging() -> Result<(), LoggingError> {
    init_logging_with_config(LogConfig::default())
}

/// Initialize logging with a custom configuration
///
/// # Example
/// ```no_run
/// use padsync_core::logging::{init_logging_with_config, LogConfig, LogLevel};
///
/// let config = LogConfig::new(LogLevel::Debug).with_target(false);
/// init_logging_with_config(config).expect("Failed to initialize logging");
/// ```
pub fn init_logging_with_config(config: LogConfig) -> Result<(), LoggingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let init = |res: Result<(), tracing_subscriber::util::TryInitError>| {
        res.map_err(|e| LoggingError::InitializationFailed(e.to_string()))
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = tfmt::layer().with_target(config.with_target);

    match (config.json_format, config.with_timestamp) {
        (true, true) => init(registry.with(layer.json()).try_init()),
        (true, false) => init(registry.with(layer.json().without_time()).try_init()),
        (false, true) => init(registry.with(layer).try_init()),
        (false, false) => init(registry.with(layer.without_time()).try_init()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_builder() {
        let config = LogConfig::new(LogLevel::Debug)
            .with_timestamp(false)
            .with_target(false)
            .json_format(true);

        assert_eq!(config.level, LogLevel::Debug);
        assert!(!config.with_timestamp);
        assert!(!config.with_target);
        assert!(config.json_format);
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("loud"), None);
        assert!(LogLevel::Trace < LogLevel::Error);
        assert_eq!(LogLevel::default().to_string(), "info");
    }

    #[test]
    fn test_from_config_section() {
        let section = LoggingConfig {
            level: "error".to_string(),
            json_format: true,
            ..Default::default()
        };
        let config = LogConfig::try_from(&section).unwrap();
        assert_eq!(config.level, LogLevel::Error);
        assert!(config.json_format);

        let bad = LoggingConfig {
            level: "loud".to_string(),
            ..Default::default()
        };
        assert!(LogConfig::try_from(&bad).is_err());
    }

    #[test]
    fn test_second_init_fails() {
        let _ = init_logging();
        assert!(matches!(
            init_logging(),
            Err(LoggingError::InitializationFailed(_))
        ));
    }
}
