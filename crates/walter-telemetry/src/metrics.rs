//! Prometheus metrics for Walter.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `walter_connections_active` | Gauge | - | Registered connections |
//! | `walter_connections_total` | Counter | `outcome` | Registration attempts |
//! | `walter_rooms_active` | Gauge | - | Existing rooms |
//! | `walter_frames_total` | Counter | `action`, `outcome` | Inbound frames |
//! | `walter_deliveries_total` | Counter | `result` | Outbound frame deliveries |
//! | `walter_handler_failures_total` | Counter | `hook` | Failed room handlers |
//!
//! The recording functions are cheap no-ops until [`init_metrics`] installs
//! a recorder.

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Global metrics handle for rendering.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names.
pub mod names {
    /// Registered connections gauge.
    pub const CONNECTIONS_ACTIVE: &str = "walter_connections_active";
    /// Registration attempts counter.
    pub const CONNECTIONS_TOTAL: &str = "walter_connections_total";
    /// Existing rooms gauge.
    pub const ROOMS_ACTIVE: &str = "walter_rooms_active";
    /// Inbound frames counter.
    pub const FRAMES_TOTAL: &str = "walter_frames_total";
    /// Outbound deliveries counter.
    pub const DELIVERIES_TOTAL: &str = "walter_deliveries_total";
    /// Handler failures counter.
    pub const HANDLER_FAILURES_TOTAL: &str = "walter_handler_failures_total";
}

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics are exported.
    pub enabled: bool,

    /// Address to expose metrics on (e.g., "0.0.0.0:9090").
    pub addr: String,

    /// Service name, attached to every metric as the `service` label.
    pub service_name: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: "0.0.0.0:9090".to_string(),
            service_name: "walter".to_string(),
        }
    }
}

/// Initializes the metrics subsystem and starts the Prometheus endpoint.
///
/// Must be called from within a Tokio runtime; the exporter is spawned onto
/// it.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidAddress` for a bad `addr` and
/// `TelemetryError::MetricsInit` if the exporter cannot be built or a
/// recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", config.addr)))?;

    let (recorder, exporter) = PrometheusBuilder::new()
        .with_http_listener(addr)
        .add_global_label("service", config.service_name.clone())
        .build()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let handle = recorder.handle();
    metrics::set_global_recorder(recorder)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = exporter.await {
            tracing::error!(error = ?e, "Prometheus exporter stopped");
        }
    });

    let _ = METRICS_HANDLE.set(handle);
    register_metric_descriptions();

    tracing::info!(addr = %addr, "Prometheus metrics exporter listening");
    Ok(())
}

/// Renders metrics in Prometheus format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_gauge!(names::CONNECTIONS_ACTIVE, "Number of registered connections");
    describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Connection registration attempts by outcome"
    );
    describe_gauge!(names::ROOMS_ACTIVE, "Number of existing rooms");
    describe_counter!(names::FRAMES_TOTAL, "Inbound frames by action and outcome");
    describe_counter!(names::DELIVERIES_TOTAL, "Outbound frame deliveries by result");
    describe_counter!(
        names::HANDLER_FAILURES_TOTAL,
        "Room handler failures by hook"
    );
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Records a registration attempt (`accepted` or `rejected`).
pub fn record_connection(outcome: &str) {
    counter!(names::CONNECTIONS_TOTAL, "outcome" => outcome.to_string()).increment(1);
}

/// Sets the registered connections gauge.
pub fn set_active_connections(count: usize) {
    gauge!(names::CONNECTIONS_ACTIVE).set(count as f64);
}

/// Sets the existing rooms gauge.
pub fn set_active_rooms(count: usize) {
    gauge!(names::ROOMS_ACTIVE).set(count as f64);
}

/// Records one handled inbound frame.
///
/// # Arguments
///
/// * `action` - `join`, `leave`, `message` or `invalid`
/// * `outcome` - what the dispatcher did with it
pub fn record_frame(action: &str, outcome: &str) {
    counter!(
        names::FRAMES_TOTAL,
        "action" => action.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Records a single delivery with the given result.
pub fn record_delivery(result: &str) {
    record_deliveries(result, 1);
}

/// Records `count` deliveries with the given result.
pub fn record_deliveries(result: &str, count: usize) {
    if count == 0 {
        return;
    }
    counter!(names::DELIVERIES_TOTAL, "result" => result.to_string()).increment(count as u64);
}

/// Records a failed room handler.
pub fn record_handler_failure(hook: &str) {
    counter!(names::HANDLER_FAILURES_TOTAL, "hook" => hook.to_string()).increment(1);
}
