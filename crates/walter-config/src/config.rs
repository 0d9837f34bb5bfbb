//! Main configuration types.
//!
//! This module provides the top-level [`WalterConfig`] struct and its builder.

use std::collections::HashSet;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use walter_telemetry::LogFormat;

use crate::{ConfigError, ServerConfig, TelemetrySection};

/// Complete Walter server configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load configuration from files
/// and environment variables.
///
/// # Example
///
/// ```
/// use walter_config::WalterConfig;
///
/// let config = WalterConfig::default();
/// assert_eq!(config.server.bind_addr, "0.0.0.0:3000");
/// assert_eq!(config.rooms, vec!["lobby".to_string()]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WalterConfig {
    /// Rooms created at startup.
    #[serde(default = "default_rooms")]
    pub rooms: Vec<String>,

    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Telemetry configuration (metrics and logging).
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

impl Default for WalterConfig {
    fn default() -> Self {
        Self {
            rooms: default_rooms(),
            server: ServerConfig::default(),
            telemetry: TelemetrySection::default(),
        }
    }
}

fn default_rooms() -> Vec<String> {
    vec!["lobby".to_string()]
}

impl WalterConfig {
    /// Create a new configuration builder.
    ///
    /// # Example
    ///
    /// ```
    /// use walter_config::{ServerConfig, WalterConfig};
    ///
    /// let config = WalterConfig::builder()
    ///     .server(ServerConfig {
    ///         bind_addr: "127.0.0.1:3000".to_string(),
    ///         ..Default::default()
    ///     })
    ///     .rooms(["lobby", "chat"])
    ///     .build();
    ///
    /// assert_eq!(config.server.bind_addr, "127.0.0.1:3000");
    /// assert_eq!(config.rooms.len(), 2);
    /// ```
    #[must_use]
    pub fn builder() -> WalterConfigBuilder {
        WalterConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - An address does not parse as a socket address
    /// - A limit, buffer or interval is zero
    /// - A room name is empty or listed twice
    /// - The log filter does not parse
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.bind_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "server.bind_addr",
                format!("invalid socket address: {}", self.server.bind_addr),
            ));
        }

        if self.server.max_connections == 0 {
            return Err(ConfigError::invalid_value(
                "server.max_connections",
                "must be at least 1",
            ));
        }

        if self.server.outbound_buffer == 0 {
            return Err(ConfigError::invalid_value(
                "server.outbound_buffer",
                "must be at least 1",
            ));
        }

        if self.server.flush_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "server.flush_timeout_ms",
                "must be at least 1",
            ));
        }

        if self.server.status_interval_secs == Some(0) {
            return Err(ConfigError::invalid_value(
                "server.status_interval_secs",
                "must be at least 1 when set",
            ));
        }

        let mut seen = HashSet::new();
        for room in &self.rooms {
            if room.is_empty() {
                return Err(ConfigError::invalid_value("rooms", "room names must not be empty"));
            }
            if !seen.insert(room.as_str()) {
                return Err(ConfigError::invalid_value(
                    "rooms",
                    format!("room \"{room}\" is listed more than once"),
                ));
            }
        }

        if self.telemetry.metrics.enabled
            && self.telemetry.metrics.addr.parse::<SocketAddr>().is_err()
        {
            return Err(ConfigError::invalid_value(
                "telemetry.metrics.addr",
                format!("invalid socket address: {}", self.telemetry.metrics.addr),
            ));
        }

        if let Err(e) = walter_telemetry::logging::create_env_filter(&self.telemetry.logging.level)
        {
            return Err(ConfigError::invalid_value(
                "telemetry.logging.level",
                e.to_string(),
            ));
        }

        Ok(())
    }

    /// Development preset: pretty debug logs, no metrics export.
    ///
    /// # Example
    ///
    /// ```
    /// use walter_config::WalterConfig;
    ///
    /// let config = WalterConfig::development();
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();

        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config.telemetry.logging.include_location = true;
        config.telemetry.environment = "development".to_string();

        config
    }

    /// Production preset: JSON info logs with metrics export enabled.
    ///
    /// # Example
    ///
    /// ```
    /// use walter_config::WalterConfig;
    ///
    /// let config = WalterConfig::production();
    /// assert_eq!(config.telemetry.logging.format, walter_telemetry::LogFormat::Json);
    /// ```
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();

        config.telemetry.logging.level = "info".to_string();
        config.telemetry.logging.format = LogFormat::Json;
        config.telemetry.environment = "production".to_string();
        config.telemetry.metrics.enabled = true;
        config.server.status_interval_secs = Some(30);

        config
    }
}

/// Builder for [`WalterConfig`].
#[derive(Debug, Default)]
pub struct WalterConfigBuilder {
    rooms: Option<Vec<String>>,
    server: Option<ServerConfig>,
    telemetry: Option<TelemetrySection>,
}

impl WalterConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rooms created at startup.
    #[must_use]
    pub fn rooms<I, S>(mut self, rooms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rooms = Some(rooms.into_iter().map(Into::into).collect());
        self
    }

    /// Set the server configuration.
    #[must_use]
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = Some(server);
        self
    }

    /// Set the telemetry configuration.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetrySection) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Build the configuration.
    ///
    /// Any unset sections will use their default values.
    #[must_use]
    pub fn build(self) -> WalterConfig {
        WalterConfig {
            rooms: self.rooms.unwrap_or_else(default_rooms),
            server: self.server.unwrap_or_default(),
            telemetry: self.telemetry.unwrap_or_default(),
        }
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<WalterConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetricsSection;

    #[test]
    fn test_default_config_is_valid() {
        let config = WalterConfig::default();
        assert_eq!(config.telemetry.service_name, "walter");
        assert!(!config.telemetry.metrics.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_bind_addr() {
        let config = WalterConfig::builder()
            .server(ServerConfig {
                bind_addr: "not-an-address".to_string(),
                ..Default::default()
            })
            .build();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bind_addr"));
    }

    #[test]
    fn test_validate_zero_limits() {
        let zero_buffer = WalterConfig::builder()
            .server(ServerConfig {
                outbound_buffer: 0,
                ..Default::default()
            })
            .build();
        assert!(zero_buffer
            .validate()
            .unwrap_err()
            .to_string()
            .contains("outbound_buffer"));

        let zero_flush = WalterConfig::builder()
            .server(ServerConfig {
                flush_timeout_ms: 0,
                ..Default::default()
            })
            .build();
        assert!(zero_flush
            .validate()
            .unwrap_err()
            .to_string()
            .contains("flush_timeout_ms"));

        let zero_interval = WalterConfig::builder()
            .server(ServerConfig {
                status_interval_secs: Some(0),
                ..Default::default()
            })
            .build();
        assert!(zero_interval
            .validate()
            .unwrap_err()
            .to_string()
            .contains("status_interval_secs"));
    }

    #[test]
    fn test_validate_duplicate_room() {
        let result = WalterConfig::builder()
            .rooms(["lobby", "chat", "lobby"])
            .build_validated();
        let err = result.unwrap_err();
        assert!(err.to_string().contains("\"lobby\" is listed more than once"));

        assert!(WalterConfig::builder().rooms([""]).build_validated().is_err());
        assert!(WalterConfig::builder()
            .rooms(Vec::<String>::new())
            .build_validated()
            .is_ok());
    }

    #[test]
    fn test_validate_invalid_metrics_addr_only_when_enabled() {
        let mut telemetry = TelemetrySection {
            metrics: MetricsSection {
                enabled: false,
                addr: "invalid".to_string(),
            },
            ..Default::default()
        };
        let config = WalterConfig::builder().telemetry(telemetry.clone()).build();
        assert!(config.validate().is_ok());

        telemetry.metrics.enabled = true;
        let config = WalterConfig::builder().telemetry(telemetry).build();
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("metrics.addr"));
    }

    #[test]
    fn test_presets() {
        let dev = WalterConfig::development();
        assert_eq!(dev.telemetry.logging.format, LogFormat::Pretty);
        assert!(dev.telemetry.logging.include_location);
        assert!(dev.validate().is_ok());

        let prod = WalterConfig::production();
        assert_eq!(prod.telemetry.logging.format, LogFormat::Json);
        assert!(prod.telemetry.metrics.enabled);
        assert_eq!(prod.server.status_interval_secs, Some(30));
        assert!(prod.validate().is_ok());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = WalterConfig::production();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[server]"));
        assert!(toml_str.contains("[telemetry.logging]"));

        let parsed: WalterConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let toml_str = r#"
            [server]
            bind_addr = "127.0.0.1:8000"
            http2_enabled = true
        "#;

        let result: Result<WalterConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }
}
