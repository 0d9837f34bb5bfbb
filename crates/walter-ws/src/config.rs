//! Room manager configuration.

use std::time::Duration;

/// Configuration for the [`RoomManager`](crate::RoomManager) and its
/// transport.
#[derive(Debug, Clone)]
pub struct RoomManagerConfig {
    /// Maximum registered connections (default: 10000).
    pub max_connections: usize,
    /// Outbound queue depth per connection, in messages (default: 256).
    pub outbound_buffer: usize,
    /// How long a closing connection's writer may keep flushing (default: 1 second).
    pub flush_timeout: Duration,
}

impl Default for RoomManagerConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            outbound_buffer: 256,
            flush_timeout: Duration::from_secs(1),
        }
    }
}

impl RoomManagerConfig {
    /// Create a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of registered connections.
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the per-connection outbound queue depth.
    pub fn outbound_buffer(mut self, size: usize) -> Self {
        self.outbound_buffer = size;
        self
    }

    /// Set the writer flush timeout used on close.
    pub fn flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_manager_config_default() {
        let config = RoomManagerConfig::default();
        assert_eq!(config.max_connections, 10_000);
        assert_eq!(config.outbound_buffer, 256);
        assert_eq!(config.flush_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_room_manager_config_builder() {
        let config = RoomManagerConfig::new()
            .max_connections(2)
            .outbound_buffer(16)
            .flush_timeout(Duration::from_millis(50));

        assert_eq!(config.max_connections, 2);
        assert_eq!(config.outbound_buffer, 16);
        assert_eq!(config.flush_timeout, Duration::from_millis(50));
    }
}
