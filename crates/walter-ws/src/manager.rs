//! The room manager service object.
//!
//! A [`RoomManager`] is constructed once at startup and shared as an
//! `Arc`. It owns the membership table and every component built on it, and
//! exposes the host API: room creation and deletion, broadcasts, stats and
//! graceful shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::broadcast::{BroadcastEngine, DeliveryReport};
use crate::config::RoomManagerConfig;
use crate::connection::{ConnectionId, ConnectionRef};
use crate::directory::RoomDirectory;
use crate::dispatcher::MessageDispatcher;
use crate::error::WsResult;
use crate::handlers::RoomHandlers;
use crate::lifecycle::LifecycleManager;
use crate::membership::Membership;
use crate::registry::ConnectionRegistry;
use crate::transport;

/// Statistics about the room manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManagerStats {
    /// Registered connections.
    pub active_connections: usize,
    /// Existing rooms.
    pub rooms: usize,
    /// Total connections ever registered.
    pub total_accepted: usize,
    /// Total connections refused.
    pub total_rejected: usize,
    /// Total connections closed.
    pub total_closed: usize,
    /// Seconds since the manager was created.
    pub uptime_secs: u64,
}

/// The room pub/sub service.
///
/// # Example
///
/// ```
/// use walter_ws::{RoomHandlers, RoomManager, RoomManagerConfig};
///
/// let manager = RoomManager::new(RoomManagerConfig::default());
/// manager.create_room("lobby", RoomHandlers::new())?;
/// assert!(manager.create_room("lobby", RoomHandlers::new()).is_err());
///
/// let stats = manager.stats();
/// assert_eq!(stats.rooms, 1);
/// assert_eq!(stats.active_connections, 0);
///
/// assert!(manager.delete_room("lobby"));
/// # Ok::<(), walter_ws::WsError>(())
/// ```
pub struct RoomManager {
    config: RoomManagerConfig,
    registry: Arc<ConnectionRegistry>,
    directory: Arc<RoomDirectory>,
    broadcaster: BroadcastEngine,
    dispatcher: MessageDispatcher,
    lifecycle: LifecycleManager,
    shutdown_tx: broadcast::Sender<()>,
    initialized: AtomicBool,
    started_at: Instant,
}

impl RoomManager {
    /// Create a new room manager.
    pub fn new(config: RoomManagerConfig) -> Arc<Self> {
        let table = Membership::shared();
        let registry = Arc::new(ConnectionRegistry::new(
            Arc::clone(&table),
            config.max_connections,
        ));
        let broadcaster = BroadcastEngine::new(Arc::clone(&table));
        let directory = Arc::new(RoomDirectory::new(
            Arc::clone(&table),
            broadcaster.clone(),
        ));
        let dispatcher = MessageDispatcher::new(Arc::clone(&directory));
        let lifecycle = LifecycleManager::new(
            Arc::clone(&registry),
            Arc::clone(&directory),
            dispatcher.clone(),
        );
        let (shutdown_tx, _) = broadcast::channel(1);

        Arc::new(Self {
            config,
            registry,
            directory,
            broadcaster,
            dispatcher,
            lifecycle,
            shutdown_tx,
            initialized: AtomicBool::new(false),
            started_at: Instant::now(),
        })
    }

    /// Create a new room manager with default configuration.
    pub fn default_manager() -> Arc<Self> {
        Self::new(RoomManagerConfig::default())
    }

    /// Get the configuration.
    pub fn config(&self) -> &RoomManagerConfig {
        &self.config
    }

    /// The connection registry.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// The room directory.
    pub fn directory(&self) -> &RoomDirectory {
        &self.directory
    }

    /// The inbound frame dispatcher.
    pub fn dispatcher(&self) -> &MessageDispatcher {
        &self.dispatcher
    }

    /// The fan-out engine.
    pub fn broadcaster(&self) -> &BroadcastEngine {
        &self.broadcaster
    }

    /// The connection lifecycle driver.
    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    /// Bind the manager to a listener and start accepting WebSocket
    /// connections on it.
    ///
    /// Only the first call has an effect. Later calls drop `listener` and
    /// return `None`.
    pub fn initialize(self: &Arc<Self>, listener: TcpListener) -> Option<JoinHandle<()>> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            warn!("Room manager already initialized; ignoring listener");
            return None;
        }

        match listener.local_addr() {
            Ok(addr) => info!(addr = %addr, "Room manager initialized"),
            Err(_) => info!("Room manager initialized"),
        }
        let shutdown = self.shutdown_receiver();
        Some(tokio::spawn(transport::accept_loop(
            Arc::clone(self),
            listener,
            shutdown,
        )))
    }

    /// Whether [`RoomManager::initialize`] has been called.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Create a room. Fails with `DuplicateRoom` if the name is taken.
    pub fn create_room(&self, name: &str, handlers: RoomHandlers) -> WsResult<()> {
        self.directory.create_room(name, handlers)
    }

    /// Delete a room. Returns `false` if it did not exist.
    pub fn delete_room(&self, name: &str) -> bool {
        self.directory.delete_room(name)
    }

    /// Send `message` to every registered connection except `exclude`.
    pub fn broadcast<T: Serialize + ?Sized>(
        &self,
        message: &T,
        exclude: Option<ConnectionId>,
    ) -> WsResult<DeliveryReport> {
        self.broadcaster.broadcast_all(message, exclude)
    }

    /// Send `message` to one connection if it is open.
    pub fn send_to<T: Serialize + ?Sized>(
        &self,
        connection: &ConnectionRef,
        message: &T,
    ) -> WsResult<bool> {
        self.broadcaster.send_to(connection, message)
    }

    /// Get statistics about the room manager.
    pub fn stats(&self) -> ManagerStats {
        let counters = self.registry.counters();
        ManagerStats {
            active_connections: self.registry.len(),
            rooms: self.directory.len(),
            total_accepted: counters.total_accepted,
            total_rejected: counters.total_rejected,
            total_closed: counters.total_closed,
            uptime_secs: self.uptime().as_secs(),
        }
    }

    /// Time since the manager was created.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Get a receiver for shutdown notifications.
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Check if shutdown has been triggered.
    pub fn is_shutdown(&self) -> bool {
        self.registry.is_closed()
    }

    /// Trigger shutdown and notify all connections.
    ///
    /// This will:
    /// 1. Refuse every later registration
    /// 2. Stop the accept loop
    /// 3. Tell every connection task to close its socket with `1001`
    ///
    /// Returns the number of connections that were registered at the time,
    /// or `0` if shutdown had already been triggered.
    pub fn shutdown(&self) -> usize {
        if !self.registry.close() {
            return 0;
        }

        let count = self.registry.len();
        info!(connections = count, "Initiating shutdown");

        // Receivers may have been dropped.
        let _ = self.shutdown_tx.send(());

        count
    }
}

impl std::fmt::Debug for RoomManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomManager")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ChannelConnection;
    use crate::message::Message;
    use serde_json::json;

    fn manager(max_connections: usize) -> Arc<RoomManager> {
        RoomManager::new(RoomManagerConfig::new().max_connections(max_connections))
    }

    fn connect(
        manager: &RoomManager,
    ) -> (ConnectionRef, tokio::sync::mpsc::Receiver<Message>) {
        let (conn, rx) = ChannelConnection::new(ConnectionId::new(), 16);
        let conn: ConnectionRef = conn;
        manager.lifecycle().open(&conn).unwrap();
        (conn, rx)
    }

    #[tokio::test]
    async fn test_broadcast_excludes_and_send_to() {
        let manager = manager(10);
        let (a, mut rx_a) = connect(&manager);
        let (b, mut rx_b) = connect(&manager);

        let report = manager
            .broadcast(&json!({"status": {"ok": true}}), Some(a.id()))
            .unwrap();
        assert_eq!(report.delivered, 1);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(
            rx_b.try_recv().unwrap(),
            Message::text(r#"{"status":{"ok":true}}"#)
        );

        assert!(manager.send_to(&a, &json!("direct")).unwrap());
        assert_eq!(rx_a.try_recv().unwrap(), Message::text("\"direct\""));

        manager.lifecycle().close(&b).await;
        assert!(!manager.send_to(&b, &json!("late")).unwrap());
    }

    #[tokio::test]
    async fn test_stats_track_totals() {
        let manager = manager(1);
        manager.create_room("lobby", RoomHandlers::new()).unwrap();
        let (a, _rx) = connect(&manager);

        let (refused, _rx2) = ChannelConnection::new(ConnectionId::new(), 4);
        let refused: ConnectionRef = refused;
        assert!(manager.lifecycle().open(&refused).is_err());

        manager.lifecycle().close(&a).await;

        let stats = manager.stats();
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.rooms, 1);
        assert_eq!(stats.total_accepted, 1);
        assert_eq!(stats.total_rejected, 1);
        assert_eq!(stats.total_closed, 1);
    }

    #[tokio::test]
    async fn test_shutdown_refuses_new_connections() {
        let manager = manager(10);
        let mut rx = manager.shutdown_receiver();
        let (_a, _rx_a) = connect(&manager);

        assert_eq!(manager.shutdown(), 1);
        assert!(manager.is_shutdown());
        assert!(rx.try_recv().is_ok());
        assert_eq!(manager.shutdown(), 0);

        let (late, _rx_late) = ChannelConnection::new(ConnectionId::new(), 4);
        let late: ConnectionRef = late;
        assert!(manager.lifecycle().open(&late).is_err());
        assert!(!late.is_open());
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let manager = manager(10);
        let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let second = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let handle = manager.initialize(first).unwrap();
        assert!(manager.is_initialized());
        assert!(manager.initialize(second).is_none());

        manager.shutdown();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_clients_leave_consistent_state() {
        const CLIENTS: usize = 64;
        const ROUNDS: usize = 20;
        const ROOMS: [&str; 4] = ["r0", "r1", "r2", "r3"];

        let manager = RoomManager::default_manager();
        for room in ROOMS {
            manager.create_room(room, RoomHandlers::new()).unwrap();
        }

        let mut tasks = Vec::new();
        for client in 0..CLIENTS {
            let manager = Arc::clone(&manager);
            tasks.push(tokio::spawn(async move {
                let (conn, mut rx) = ChannelConnection::new(ConnectionId::new(), 64);
                let conn: ConnectionRef = conn;
                let lifecycle = manager.lifecycle();
                lifecycle.open(&conn).unwrap();

                for round in 0..ROUNDS {
                    let room = ROOMS[(client + round) % ROOMS.len()];
                    let next = ROOMS[(client + round + 1) % ROOMS.len()];
                    let frames = [
                        json!({"action": "join", "room": room}),
                        json!({"action": "join", "room": "scratch"}),
                        json!({"action": "message", "room": room, "data": round}),
                        json!({"action": "leave", "room": next}),
                    ];
                    for frame in frames {
                        lifecycle
                            .frame(&conn, &Message::text(frame.to_string()))
                            .await;
                    }
                    while rx.try_recv().is_ok() {}
                    tokio::task::yield_now().await;
                }

                assert!(lifecycle.close(&conn).await);
            }));
        }

        let host = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                for _ in 0..ROUNDS {
                    let _ = manager.create_room("scratch", RoomHandlers::new());
                    tokio::task::yield_now().await;
                    manager.delete_room("scratch");
                }
            })
        };

        for task in tasks {
            task.await.unwrap();
        }
        host.await.unwrap();

        let stats = manager.stats();
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.total_accepted, CLIENTS);
        assert_eq!(stats.total_closed, CLIENTS);
        for room in ROOMS {
            assert!(manager.directory().members(room).unwrap().is_empty());
        }
        assert!(!manager.directory().contains("scratch"));
    }

    #[test]
    fn test_stats_serialize() {
        let stats = ManagerStats {
            active_connections: 2,
            rooms: 1,
            ..ManagerStats::default()
        };
        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["active_connections"], 2);
        assert_eq!(value["rooms"], 1);
    }
}
