//! Typed configuration for the Walter room server.
//!
//! - TOML and JSON configuration files
//! - `.env` files and environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! # Example
//!
//! ```no_run
//! use walter_config::ConfigLoader;
//!
//! # fn main() -> Result<(), walter_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_optional_file("walter.toml")?
//!     .with_dotenv()?
//!     .with_env_prefix("WALTER")
//!     .load()?;
//!
//! println!("Rooms {:?} on {}", config.rooms, config.server.bind_addr);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! rooms = ["lobby"]
//!
//! [server]
//! bind_addr = "0.0.0.0:3000"
//! max_connections = 10000
//! outbound_buffer = 256
//! shutdown_timeout_secs = 10
//! flush_timeout_ms = 1000
//! status_interval_secs = 30
//!
//! [telemetry]
//! service_name = "walter"
//! environment = "production"
//!
//! [telemetry.metrics]
//! enabled = true
//! addr = "0.0.0.0:9090"
//!
//! [telemetry.logging]
//! enabled = true
//! level = "info"
//! format = "json"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with variables of the form `PREFIX__SECTION__KEY`:
//!
//! - `WALTER__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `WALTER__ROOMS=lobby,chat`
//! - `WALTER__TELEMETRY__METRICS__ENABLED=true`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::{WalterConfig, WalterConfigBuilder};
pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::{LoggingSection, MetricsSection, ServerConfig, TelemetrySection};
