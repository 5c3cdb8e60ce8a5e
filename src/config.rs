//! Session configuration
//!
//! Loaded from TOML, overridable from `PADSYNC_*` environment variables.
//!
//! ```toml
//! pad_id = "meeting-notes"
//! client_id = "bot-1"
//! protocol_version = 2
//!
//! [logging]
//! level = "debug"
//! json_format = true
//! ```

use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use thiserror::Error;

/// Protocol version sent in `CLIENT_READY`
pub const PROTOCOL_VERSION: u32 = 2;

/// Default capacity of the session actor's command channel
pub const DEFAULT_COMMAND_BUFFER: usize = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    FileReadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Failed to serialize configuration: {0}")]
    SerializeError(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for one pad session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Pad to join
    pub pad_id: String,

    /// Local name for this client, used in log fields
    pub client_id: String,

    /// Author token; generated when absent
    pub token: Option<String>,

    pub protocol_version: u32,

    /// Capacity of the actor's command channel
    pub command_buffer: usize,

    pub logging: LoggingConfig,
}

/// Logging section of [`SessionConfig`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pad_id: String::new(),
            client_id: "padsync".to_string(),
            token: None,
            protocol_version: PROTOCOL_VERSION,
            command_buffer: DEFAULT_COMMAND_BUFFER,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl SessionConfig {
    /// Default configuration for `pad_id`
    pub fn new(pad_id: impl Into<String>) -> Self {
        Self {
            pad_id: pad_id.into(),
            ..Default::default()
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        Self::from_toml_str(&contents)
    }

    /// Load configuration from environment variables on top of the defaults
    ///
    /// Variables follow the pattern `PADSYNC_<KEY>`, e.g. `PADSYNC_PAD_ID=notes`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `PADSYNC_*` environment variables
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Override fields from `PADSYNC_*` keys looked up through `var`
    pub fn apply_overrides(
        &mut self,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(pad_id) = var("PADSYNC_PAD_ID") {
            self.pad_id = pad_id;
        }
        if let Some(client_id) = var("PADSYNC_CLIENT_ID") {
            self.client_id = client_id;
        }
        if let Some(token) = var("PADSYNC_TOKEN") {
            self.token = Some(token);
        }
        if let Some(version) = var("PADSYNC_PROTOCOL_VERSION") {
            self.protocol_version = version.parse().map_err(|e| {
                ConfigError::InvalidValue(format!("Invalid protocol version: {}", e))
            })?;
        }
        if let Some(buffer) = var("PADSYNC_COMMAND_BUFFER") {
            self.command_buffer = buffer.parse().map_err(|e| {
                ConfigError::InvalidValue(format!("Invalid command buffer: {}", e))
            })?;
        }
        if let Some(level) = var("PADSYNC_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = var("PADSYNC_LOG_JSON") {
            self.logging.json_format = json
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid JSON flag: {}", e)))?;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pad_id.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "pad_id must not be empty".to_string(),
            ));
        }

        if self.command_buffer == 0 {
            return Err(ConfigError::ValidationFailed(
                "command_buffer must be greater than 0".to_string(),
            ));
        }

        if self.protocol_version == 0 {
            return Err(ConfigError::ValidationFailed(
                "protocol_version must be greater than 0".to_string(),
            ));
        }

        if matches!(&self.token, Some(t) if t.is_empty()) {
            return Err(ConfigError::ValidationFailed(
                "token must not be empty when set".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// The configured token, or a fresh random one
    pub fn token_or_generate(&self) -> String {
        self.token.clone().unwrap_or_else(generate_token)
    }
}

/// A random author token: `"t."` followed by 20 alphanumerics
pub fn generate_token() -> String {
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(20)
        .map(char::from)
        .collect();
    format!("t.{}", suffix)
}
