//! Connection handles.
//!
//! The room manager never touches a socket directly. It holds
//! [`ConnectionRef`]s, trait objects that expose an identity, a status and a
//! non-blocking send. [`ChannelConnection`] is the implementation used by the
//! transport: sends are pushed onto a bounded queue that the connection's
//! writer task drains into the socket.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::error::{WsError, WsResult};
use crate::message::Message;

/// A unique identifier for a WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Create a new random connection ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create a connection ID from a UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ConnectionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Liveness of a connection.
///
/// Transitions are `Connecting → Open → Closed`; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionStatus {
    /// Upgrade completed, not yet registered.
    Connecting = 0,
    /// Registered and accepting frames.
    Open = 1,
    /// Closed by either side. Terminal.
    Closed = 2,
}

impl ConnectionStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            _ => Self::Closed,
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// A handle to one bidirectional message channel.
pub trait Connection: Send + Sync {
    /// The connection identity.
    fn id(&self) -> ConnectionId;

    /// The current liveness status.
    fn status(&self) -> ConnectionStatus;

    /// Queue a message for delivery without waiting for the socket.
    fn send(&self, msg: Message) -> WsResult<()>;

    /// Remote address, when the transport knows it.
    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }

    /// Move `Connecting → Open`. Returns `false` if the connection was not
    /// `Connecting`.
    fn mark_open(&self) -> bool;

    /// Move to `Closed`. Returns `false` if it was already closed.
    fn mark_closed(&self) -> bool;

    /// Whether sends are currently accepted.
    fn is_open(&self) -> bool {
        self.status() == ConnectionStatus::Open
    }
}

/// Shared handle to a connection.
pub type ConnectionRef = Arc<dyn Connection>;

/// A connection backed by a bounded outbound queue.
///
/// # Example
///
/// ```
/// use walter_ws::{ChannelConnection, Connection, ConnectionId, Message};
///
/// let (conn, mut outbound) = ChannelConnection::new(ConnectionId::new(), 8);
/// assert!(conn.send(Message::text("early")).is_err());
///
/// conn.mark_open();
/// conn.send(Message::text("hello")).unwrap();
/// assert_eq!(outbound.try_recv().unwrap(), Message::text("hello"));
/// ```
#[derive(Debug)]
pub struct ChannelConnection {
    id: ConnectionId,
    status: AtomicU8,
    outbound: mpsc::Sender<Message>,
    peer_addr: Option<SocketAddr>,
}

impl ChannelConnection {
    /// Create a connection in the `Connecting` state with an outbound queue
    /// of `capacity` messages. Returns the handle and the queue's receiving
    /// end for the writer task.
    pub fn new(id: ConnectionId, capacity: usize) -> (Arc<Self>, mpsc::Receiver<Message>) {
        Self::with_peer(id, capacity, None)
    }

    /// Like [`ChannelConnection::new`], recording the remote address.
    pub fn with_peer(
        id: ConnectionId,
        capacity: usize,
        peer_addr: Option<SocketAddr>,
    ) -> (Arc<Self>, mpsc::Receiver<Message>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let conn = Arc::new(Self {
            id,
            status: AtomicU8::new(ConnectionStatus::Connecting as u8),
            outbound,
            peer_addr,
        });
        (conn, rx)
    }

    /// Queue a close frame regardless of status.
    ///
    /// Used by the transport when it tears a connection down.
    pub(crate) fn send_close(&self, msg: Message) {
        debug_assert!(msg.is_close());
        let _ = self.outbound.try_send(msg);
    }
}

impl Connection for ChannelConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn send(&self, msg: Message) -> WsResult<()> {
        if !self.is_open() {
            return Err(WsError::connection_closed(format!(
                "connection {} is {}",
                self.id,
                self.status()
            )));
        }

        self.outbound.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => WsError::send_failed("outbound queue full"),
            TrySendError::Closed(_) => WsError::send_failed("writer task has exited"),
        })
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    fn mark_open(&self) -> bool {
        self.status
            .compare_exchange(
                ConnectionStatus::Connecting as u8,
                ConnectionStatus::Open as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn mark_closed(&self) -> bool {
        self.status.swap(ConnectionStatus::Closed as u8, Ordering::AcqRel)
            != ConnectionStatus::Closed as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_connection_id_display() {
        let uuid = Uuid::now_v7();
        let id = ConnectionId::from_uuid(uuid);
        assert_eq!(id.to_string(), uuid.to_string());
        assert_eq!(id.as_uuid(), uuid);
    }

    #[test]
    fn test_status_transitions() {
        let (conn, _rx) = ChannelConnection::new(ConnectionId::new(), 4);
        assert_eq!(conn.status(), ConnectionStatus::Connecting);

        assert!(conn.mark_open());
        assert!(!conn.mark_open());
        assert!(conn.is_open());

        assert!(conn.mark_closed());
        assert!(!conn.mark_closed());
        assert_eq!(conn.status(), ConnectionStatus::Closed);

        // Closed is terminal.
        assert!(!conn.mark_open());
        assert_eq!(conn.status(), ConnectionStatus::Closed);
    }

    #[test]
    fn test_send_requires_open() {
        let (conn, mut rx) = ChannelConnection::new(ConnectionId::new(), 4);
        let err = conn.send(Message::text("x")).unwrap_err();
        assert!(matches!(err, WsError::ConnectionClosed { .. }));

        conn.mark_open();
        conn.send(Message::text("x")).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Message::text("x"));

        conn.mark_closed();
        assert!(conn.send(Message::text("y")).is_err());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_fails_when_queue_full() {
        let (conn, _rx) = ChannelConnection::new(ConnectionId::new(), 1);
        conn.mark_open();
        conn.send(Message::text("first")).unwrap();
        let err = conn.send(Message::text("second")).unwrap_err();
        assert!(matches!(err, WsError::SendFailed(_)));
    }

    #[test]
    fn test_send_fails_when_writer_gone() {
        let (conn, rx) = ChannelConnection::new(ConnectionId::new(), 4);
        conn.mark_open();
        drop(rx);
        assert!(matches!(
            conn.send(Message::text("x")),
            Err(WsError::SendFailed(_))
        ));
    }

    #[test]
    fn test_send_close_bypasses_status() {
        let (conn, mut rx) = ChannelConnection::with_peer(
            ConnectionId::new(),
            4,
            Some("127.0.0.1:9000".parse().unwrap()),
        );
        conn.mark_closed();
        conn.send_close(Message::close(crate::CloseCode::GoingAway, "bye"));
        assert!(rx.try_recv().unwrap().is_close());
        assert_eq!(conn.peer_addr().unwrap().port(), 9000);
    }
}
