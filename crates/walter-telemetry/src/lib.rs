//! Observability for Walter.
//!
//! - **Logging**: structured output through `tracing-subscriber`, JSON or
//!   pretty, filtered by an `EnvFilter`
//! - **Metrics**: Prometheus-format metrics via the `metrics` crate
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                walter-server                 │
//! │                                              │
//! │  ┌────────────────────────────────────────┐  │
//! │  │           walter-telemetry             │  │
//! │  │                                        │  │
//! │  │   ┌─────────────┐   ┌─────────────┐    │  │
//! │  │   │   Metrics   │   │   Logging   │    │  │
//! │  │   │ (Prometheus)│   │(JSON/pretty)│    │  │
//! │  │   └──────┬──────┘   └──────┬──────┘    │  │
//! │  └──────────┼─────────────────┼───────────┘  │
//! └─────────────┼─────────────────┼──────────────┘
//!               ▼                 ▼
//!         ┌──────────┐      ┌──────────┐
//!         │ /metrics │      │  stdout  │
//!         └──────────┘      └──────────┘
//! ```
//!
//! See [`metrics`] for the standard metric set.
//!
//! # Example
//!
//! ```rust,ignore
//! use walter_telemetry::{init_telemetry, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TelemetryConfig::for_environment("walter", "production");
//!
//!     init_telemetry(&config).expect("Failed to init telemetry");
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig, LogFormat};
pub use metrics::{init_metrics, render_metrics, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Initializes logging, then metrics.
///
/// Metrics export needs a running Tokio runtime.
///
/// # Errors
///
/// Returns `TelemetryError` if either subsystem fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)?;
    tracing::info!(
        service = %config.service_name,
        environment = %config.environment,
        metrics = config.metrics.enabled,
        "Telemetry initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_with_everything_disabled() {
        let mut config = TelemetryConfig::default();
        config.logging.enabled = false;
        assert!(init_telemetry(&config).is_ok());
        assert!(render_metrics().is_none());
    }
}
