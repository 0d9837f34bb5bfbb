//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections.

use serde::{Deserialize, Serialize};
use walter_telemetry::{LogConfig, LogFormat, MetricsConfig, TelemetryConfig};

/// Server configuration section.
///
/// Controls the listener, connection limits and shutdown behaviour.
///
/// # Example
///
/// ```
/// use walter_config::ServerConfig;
///
/// let config = ServerConfig {
///     bind_addr: "127.0.0.1:3000".to_string(),
///     max_connections: 500,
///     ..Default::default()
/// };
/// assert_eq!(config.outbound_buffer, 256);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// WebSocket listener bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Maximum number of registered connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Capacity of each connection's outbound queue, in frames.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// How long a closing connection may keep flushing queued frames, in
    /// milliseconds.
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,

    /// Interval of the status broadcast in seconds. None disables it.
    #[serde(default)]
    pub status_interval_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_connections: default_max_connections(),
            outbound_buffer: default_outbound_buffer(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            flush_timeout_ms: default_flush_timeout_ms(),
            status_interval_secs: None,
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_max_connections() -> usize {
    10_000
}

fn default_outbound_buffer() -> usize {
    256
}

fn default_shutdown_timeout() -> u64 {
    10
}

fn default_flush_timeout_ms() -> u64 {
    1_000
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    /// Enable the Prometheus exporter.
    #[serde(default)]
    pub enabled: bool,

    /// Prometheus metrics endpoint address.
    #[serde(default = "default_metrics_addr")]
    pub addr: String,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_metrics_addr(),
        }
    }
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log filter (trace, debug, info, warn, error, or full directives).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include source file and line in logs.
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            include_location: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Telemetry configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySection {
    /// Service name for telemetry identification.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Deployment environment (e.g., "development", "production").
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsSection,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            environment: default_environment(),
            metrics: MetricsSection::default(),
            logging: LoggingSection::default(),
        }
    }
}

impl TelemetrySection {
    /// Convert into the runtime telemetry configuration.
    pub fn to_telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig::new(&self.service_name)
            .with_environment(&self.environment)
            .with_metrics(MetricsConfig {
                enabled: self.metrics.enabled,
                addr: self.metrics.addr.clone(),
                ..MetricsConfig::default()
            })
            .with_logging(LogConfig {
                enabled: self.logging.enabled,
                level: self.logging.level.clone(),
                format: self.logging.format,
                file_line_info: self.logging.include_location,
                ..LogConfig::default()
            })
    }
}

fn default_service_name() -> String {
    "walter".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_true() -> bool {
    true
}
