//! The connection registry.
//!
//! Tracks every live connection together with the set of rooms it has
//! joined, enforces the connection limit and refuses new registrations once
//! shutdown has begun.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::connection::{ConnectionId, ConnectionRef};
use crate::error::{WsError, WsResult};
use crate::membership::SharedMembership;

/// A point-in-time view of one registered connection.
#[derive(Clone)]
pub struct ConnectionInfo {
    /// The connection handle.
    pub connection: ConnectionRef,
    /// Rooms the connection has joined.
    pub rooms: Vec<String>,
    /// When the connection was registered.
    pub registered_at: Instant,
}

impl ConnectionInfo {
    /// The connection ID.
    pub fn id(&self) -> ConnectionId {
        self.connection.id()
    }

    /// How long the connection has been registered.
    pub fn duration(&self) -> std::time::Duration {
        self.registered_at.elapsed()
    }
}

impl std::fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("id", &self.connection.id())
            .field("status", &self.connection.status())
            .field("rooms", &self.rooms)
            .finish_non_exhaustive()
    }
}

/// Registration counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryCounters {
    /// Total connections ever registered.
    pub total_accepted: usize,
    /// Total registrations refused by the limit or by shutdown.
    pub total_rejected: usize,
    /// Total connections unregistered.
    pub total_closed: usize,
}

/// Registry of live connections.
pub struct ConnectionRegistry {
    table: SharedMembership,
    max_connections: usize,
    total_accepted: AtomicUsize,
    total_rejected: AtomicUsize,
    total_closed: AtomicUsize,
    closed: AtomicBool,
}

impl ConnectionRegistry {
    pub(crate) fn new(table: SharedMembership, max_connections: usize) -> Self {
        Self {
            table,
            max_connections,
            total_accepted: AtomicUsize::new(0),
            total_rejected: AtomicUsize::new(0),
            total_closed: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Register a connection with an empty room set.
    ///
    /// Returns `Ok(false)` if a connection with the same identity is already
    /// registered; nothing is changed in that case.
    pub fn register(&self, connection: ConnectionRef) -> WsResult<bool> {
        if self.closed.load(Ordering::SeqCst) {
            self.total_rejected.fetch_add(1, Ordering::Relaxed);
            walter_telemetry::metrics::record_connection("rejected");
            return Err(WsError::connection_limit("server is shutting down"));
        }

        let id = connection.id();
        let mut table = self.table.lock();

        if table.connection(&id).is_some() {
            debug!(connection_id = %id, "Connection already registered");
            return Ok(false);
        }

        let current = table.connection_count();
        if current >= self.max_connections {
            drop(table);
            self.total_rejected.fetch_add(1, Ordering::Relaxed);
            walter_telemetry::metrics::record_connection("rejected");
            warn!(
                current = current,
                max = self.max_connections,
                "Connection limit reached"
            );
            return Err(WsError::connection_limit(format!(
                "maximum connections ({}) reached",
                self.max_connections
            )));
        }

        table.insert_connection(connection);
        let total = table.connection_count();
        drop(table);

        self.total_accepted.fetch_add(1, Ordering::Relaxed);
        walter_telemetry::metrics::record_connection("accepted");
        walter_telemetry::metrics::set_active_connections(total);
        debug!(connection_id = %id, total = total, "Connection registered");
        Ok(true)
    }

    /// Remove a connection.
    ///
    /// Memberships still present are cleared on both sides first. Returns the
    /// names of those stale rooms, or `None` if the connection was not
    /// registered.
    pub fn unregister(&self, id: &ConnectionId) -> Option<Vec<String>> {
        let mut table = self.table.lock();
        let (_, stale) = table.remove_connection(id)?;
        let total = table.connection_count();
        drop(table);

        self.total_closed.fetch_add(1, Ordering::Relaxed);
        walter_telemetry::metrics::set_active_connections(total);
        if stale.is_empty() {
            debug!(connection_id = %id, "Connection unregistered");
        } else {
            warn!(
                connection_id = %id,
                rooms = ?stale,
                "Connection unregistered with stale memberships"
            );
        }
        Some(stale)
    }

    /// Snapshot of the rooms a connection has joined.
    ///
    /// Empty for unknown connections.
    pub fn rooms_of(&self, id: &ConnectionId) -> Vec<String> {
        let table = self.table.lock();
        table
            .connection(id)
            .map(|entry| {
                let mut rooms: Vec<String> = entry.rooms.iter().cloned().collect();
                rooms.sort();
                rooms
            })
            .unwrap_or_default()
    }

    /// Get a registered connection.
    pub fn get(&self, id: &ConnectionId) -> Option<ConnectionInfo> {
        let table = self.table.lock();
        table.connection(id).map(|entry| ConnectionInfo {
            connection: Arc::clone(&entry.handle),
            rooms: entry.rooms.iter().cloned().collect(),
            registered_at: entry.registered_at,
        })
    }

    /// Check if a connection is registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.table.lock().connection(id).is_some()
    }

    /// Get the number of registered connections.
    pub fn len(&self) -> usize {
        self.table.lock().connection_count()
    }

    /// Check if no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every registered connection handle.
    pub fn connections(&self) -> Vec<ConnectionRef> {
        self.table.lock().handles()
    }

    /// Snapshot of every registered connection with its rooms.
    pub fn infos(&self) -> Vec<ConnectionInfo> {
        let table = self.table.lock();
        table
            .connections()
            .map(|entry| ConnectionInfo {
                connection: Arc::clone(&entry.handle),
                rooms: entry.rooms.iter().cloned().collect(),
                registered_at: entry.registered_at,
            })
            .collect()
    }

    /// Registration counters.
    pub fn counters(&self) -> RegistryCounters {
        RegistryCounters {
            total_accepted: self.total_accepted.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
            total_closed: self.total_closed.load(Ordering::Relaxed),
        }
    }

    /// Refuse every later registration. Returns `false` if already closed.
    pub(crate) fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    /// Whether registration has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("len", &self.len())
            .field("max_connections", &self.max_connections)
            .field("counters", &self.counters())
            .finish()
    }
}
