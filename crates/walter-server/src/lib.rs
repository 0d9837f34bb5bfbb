//! The Walter room server.
//!
//! Loads a [`WalterConfig`](walter_config::WalterConfig), creates the
//! configured rooms and serves WebSocket clients until an OS signal asks it
//! to stop. Optionally pushes `{"status": ...}` to every client on a fixed
//! interval.

pub mod server;
pub mod shutdown;
pub mod status;

pub use server::WalterServer;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
