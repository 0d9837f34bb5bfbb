//! Connection lifecycle.
//!
//! The transport drives each connection through explicit transitions:
//!
//! ```text
//! Connecting --open--> Open --close--> Closed
//!                       |
//!                     frame (zero or more, only while Open)
//! ```
//!
//! Closing runs the disconnect protocol: every joined room is left with
//! `is_disconnect = true`, then the connection is unregistered.

use std::sync::Arc;

use tracing::{debug, info};

use crate::connection::{ConnectionRef, ConnectionStatus};
use crate::directory::RoomDirectory;
use crate::dispatcher::{DispatchOutcome, MessageDispatcher};
use crate::error::{WsError, WsResult};
use crate::message::Message;
use crate::registry::ConnectionRegistry;

/// Drives open, frame and close events.
#[derive(Clone)]
pub struct LifecycleManager {
    registry: Arc<ConnectionRegistry>,
    directory: Arc<RoomDirectory>,
    dispatcher: MessageDispatcher,
}

impl LifecycleManager {
    pub(crate) fn new(
        registry: Arc<ConnectionRegistry>,
        directory: Arc<RoomDirectory>,
        dispatcher: MessageDispatcher,
    ) -> Self {
        Self {
            registry,
            directory,
            dispatcher,
        }
    }

    /// Mark the connection open and register it.
    ///
    /// When the registry refuses it, the connection is marked closed and the
    /// refusal is returned so the transport can close the socket.
    pub fn open(&self, connection: &ConnectionRef) -> WsResult<()> {
        if connection.status() == ConnectionStatus::Closed {
            return Err(WsError::connection_closed(format!(
                "connection {} is already closed",
                connection.id()
            )));
        }
        connection.mark_open();

        match self.registry.register(Arc::clone(connection)) {
            Ok(true) => {
                info!(
                    connection_id = %connection.id(),
                    peer = ?connection.peer_addr(),
                    "Client connected"
                );
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => {
                connection.mark_closed();
                Err(e)
            }
        }
    }

    /// Dispatch one inbound frame.
    ///
    /// Returns `None` without dispatching when the connection is not open or
    /// the frame is a control frame.
    pub async fn frame(&self, connection: &ConnectionRef, msg: &Message) -> Option<DispatchOutcome> {
        if !connection.is_open() || !msg.is_data() {
            return None;
        }
        debug!(
            connection_id = %connection.id(),
            kind = msg.kind(),
            len = msg.len(),
            "Frame received"
        );
        Some(self.dispatcher.handle(connection, msg).await)
    }

    /// Close the connection and run disconnect cleanup.
    ///
    /// Safe to call more than once; only the first call that finds the
    /// connection registered does any work, and that call returns `true`.
    pub async fn close(&self, connection: &ConnectionRef) -> bool {
        connection.mark_closed();
        let id = connection.id();
        if !self.registry.contains(&id) {
            return false;
        }

        let rooms = self.registry.rooms_of(&id);
        for room in &rooms {
            self.directory.leave(connection, room, true).await;
        }

        let cleaned = self.registry.unregister(&id).is_some();
        if cleaned {
            info!(connection_id = %id, rooms = rooms.len(), "Client disconnected");
        }
        cleaned
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::BroadcastEngine;
    use crate::connection::{ChannelConnection, ConnectionId};
    use crate::handlers::RoomHandlers;
    use crate::membership::Membership;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct Fixture {
        registry: Arc<ConnectionRegistry>,
        directory: Arc<RoomDirectory>,
        lifecycle: LifecycleManager,
    }

    fn fixture(max_connections: usize) -> Fixture {
        let table = Membership::shared();
        let registry = Arc::new(ConnectionRegistry::new(Arc::clone(&table), max_connections));
        let directory = Arc::new(RoomDirectory::new(
            Arc::clone(&table),
            BroadcastEngine::new(Arc::clone(&table)),
        ));
        let dispatcher = MessageDispatcher::new(Arc::clone(&directory));
        let lifecycle =
            LifecycleManager::new(Arc::clone(&registry), Arc::clone(&directory), dispatcher);
        Fixture {
            registry,
            directory,
            lifecycle,
        }
    }

    fn new_conn() -> (ConnectionRef, mpsc::Receiver<Message>) {
        let (conn, rx) = ChannelConnection::new(ConnectionId::new(), 16);
        let conn: ConnectionRef = conn;
        (conn, rx)
    }

    #[tokio::test]
    async fn test_open_registers_connection() {
        let fx = fixture(10);
        let (c, _rx) = new_conn();

        fx.lifecycle.open(&c).unwrap();
        assert!(c.is_open());
        assert!(fx.registry.contains(&c.id()));

        // A second open is a no-op.
        fx.lifecycle.open(&c).unwrap();
        assert_eq!(fx.registry.len(), 1);
    }

    #[tokio::test]
    async fn test_open_refused_marks_closed() {
        let fx = fixture(1);
        let (first, _rx1) = new_conn();
        let (second, _rx2) = new_conn();

        fx.lifecycle.open(&first).unwrap();
        let err = fx.lifecycle.open(&second).unwrap_err();
        assert!(matches!(err, WsError::ConnectionLimitReached(_)));
        assert_eq!(second.status(), ConnectionStatus::Closed);
        assert!(!fx.lifecycle.close(&second).await);
    }

    #[tokio::test]
    async fn test_frames_only_dispatched_while_open() {
        let fx = fixture(10);
        fx.directory.create_room("lobby", RoomHandlers::new()).unwrap();
        let (c, mut rx) = new_conn();
        let join = Message::text(r#"{"action":"join","room":"lobby"}"#);

        assert!(fx.lifecycle.frame(&c, &join).await.is_none());

        fx.lifecycle.open(&c).unwrap();
        assert_eq!(
            fx.lifecycle.frame(&c, &join).await,
            Some(DispatchOutcome::Joined)
        );
        assert!(rx.try_recv().is_ok());
        assert!(fx.lifecycle.frame(&c, &Message::Ping(vec![])).await.is_none());

        fx.lifecycle.close(&c).await;
        assert!(fx.lifecycle.frame(&c, &join).await.is_none());
    }

    #[tokio::test]
    async fn test_close_leaves_every_room_as_disconnect() {
        let fx = fixture(10);
        let seen = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b"] {
            let log = Arc::clone(&seen);
            fx.directory
                .create_room(
                    name,
                    RoomHandlers::new().on_unsubscribe(move |_conn, is_disconnect| {
                        log.lock().unwrap().push((name, is_disconnect));
                        async { Ok(()) }
                    }),
                )
                .unwrap();
        }

        let (c, mut rx) = new_conn();
        fx.lifecycle.open(&c).unwrap();
        fx.directory.join(&c, "a").await.unwrap();
        fx.directory.join(&c, "b").await.unwrap();
        while rx.try_recv().is_ok() {}

        assert!(fx.lifecycle.close(&c).await);
        assert!(!fx.lifecycle.close(&c).await);

        let mut calls = seen.lock().unwrap().clone();
        calls.sort_unstable();
        assert_eq!(calls, vec![("a", true), ("b", true)]);
        assert!(fx.directory.members("a").unwrap().is_empty());
        assert!(fx.directory.members("b").unwrap().is_empty());
        assert!(!fx.registry.contains(&c.id()));
        // No default leave notice on disconnect.
        assert!(rx.try_recv().is_err());
    }
}
