//! Telemetry settings for one Walter process.
//!
//! The service name is set once on [`TelemetryConfig`]. Attaching metrics or
//! logging settings stamps it onto them, so the `service` metric label and the
//! log field always agree.

use crate::logging::LogConfig;
use crate::metrics::MetricsConfig;

/// Settings for logging and metrics export.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Name reported by every metric and log line.
    pub service_name: String,

    /// Deployment environment label.
    pub environment: String,

    /// Prometheus exporter settings.
    pub metrics: MetricsConfig,

    /// Log subscriber settings.
    pub logging: LogConfig,
}

impl TelemetryConfig {
    /// Default settings for `service_name` in the development environment.
    pub fn new(service_name: impl Into<String>) -> Self {
        let service_name = service_name.into();
        Self {
            metrics: MetricsConfig {
                service_name: service_name.clone(),
                ..MetricsConfig::default()
            },
            logging: LogConfig {
                service_name: service_name.clone(),
                ..LogConfig::default()
            },
            environment: "development".to_string(),
            service_name,
        }
    }

    /// Preset for a named environment.
    ///
    /// `production` gets JSON logs and the metrics exporter, `development`
    /// gets verbose pretty logs. Any other name keeps the defaults.
    ///
    /// ```
    /// use walter_telemetry::{LogFormat, TelemetryConfig};
    ///
    /// let config = TelemetryConfig::for_environment("walter-eu", "production");
    /// assert!(config.metrics.enabled);
    /// assert_eq!(config.logging.format, LogFormat::Json);
    /// assert_eq!(config.logging.service_name, "walter-eu");
    /// ```
    pub fn for_environment(service_name: impl Into<String>, environment: &str) -> Self {
        let base = Self::new(service_name).with_environment(environment);
        match environment {
            "production" => {
                let metrics = MetricsConfig {
                    enabled: true,
                    ..base.metrics.clone()
                };
                base.with_metrics(metrics).with_logging(LogConfig::production())
            }
            "development" => base.with_logging(LogConfig::development()),
            _ => base,
        }
    }

    /// Set the environment label.
    #[must_use]
    pub fn with_environment(mut self, environment: &str) -> Self {
        self.environment = environment.to_string();
        self
    }

    /// Replace the metrics settings, keeping this config's service name.
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsConfig) -> Self {
        self.metrics = MetricsConfig {
            service_name: self.service_name.clone(),
            ..metrics
        };
        self
    }

    /// Replace the logging settings, keeping this config's service name.
    #[must_use]
    pub fn with_logging(mut self, logging: LogConfig) -> Self {
        self.logging = LogConfig {
            service_name: self.service_name.clone(),
            ..logging
        };
        self
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::new("walter")
    }
}
