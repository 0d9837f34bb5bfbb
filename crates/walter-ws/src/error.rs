//! Error types for the room manager.
//!
//! Every failure in this crate is a [`WsError`]. Client-facing failures
//! (malformed frames, unknown rooms, membership violations) are turned into
//! an `{"error": ...}` frame with [`WsError::client_message`]; host-facing
//! failures (duplicate rooms, transport setup) are returned to the caller.

use std::fmt;
use thiserror::Error;

/// Result type for room manager operations.
pub type WsResult<T> = Result<T, WsError>;

/// Errors that can occur in the room manager and its transport.
#[derive(Debug, Error)]
pub enum WsError {
    /// The inbound payload was not well-formed JSON.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The envelope was well-formed but violated the frame schema.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The named room does not exist.
    #[error("room not found: {room}")]
    RoomNotFound {
        /// Name of the missing room.
        room: String,
    },

    /// The connection tried to publish into a room it has not joined.
    #[error("connection is not a member of room {room}")]
    NotAMember {
        /// Name of the room.
        room: String,
    },

    /// A room with this name already exists.
    #[error("room already exists: {room}")]
    DuplicateRoom {
        /// Name of the existing room.
        room: String,
    },

    /// A host-supplied room handler failed or panicked.
    #[error("{hook} handler for room {room} failed: {reason}")]
    Handler {
        /// Room the handler is bound to.
        room: String,
        /// Which hook failed.
        hook: HandlerHook,
        /// Rendered handler error or panic payload.
        reason: String,
    },

    /// The HTTP request was not a valid WebSocket upgrade request.
    #[error("not a WebSocket upgrade request: {reason}")]
    NotWebSocketRequest {
        /// Reason why the request is not a valid WebSocket upgrade.
        reason: String,
    },

    /// The WebSocket handshake failed.
    #[error("WebSocket handshake failed: {0}")]
    HandshakeFailed(String),

    /// The connection is not open.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closing.
        reason: String,
    },

    /// Failed to queue or write a message.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// The message payload could not be encoded.
    #[error("failed to encode message: {0}")]
    EncodeFailed(String),

    /// Connection refused by the registry.
    #[error("connection limit reached: {0}")]
    ConnectionLimitReached(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Tungstenite error.
    #[error("tungstenite error: {0}")]
    Tungstenite(#[from] tungstenite::Error),

    /// Hyper error while serving the upgrade request.
    #[error("http error: {0}")]
    Hyper(#[from] hyper::Error),
}

impl WsError {
    /// Create a new protocol error.
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol(reason.into())
    }

    /// Create a new validation error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    /// Create a new room not found error.
    pub fn room_not_found(room: impl Into<String>) -> Self {
        Self::RoomNotFound { room: room.into() }
    }

    /// Create a new not-a-member error.
    pub fn not_a_member(room: impl Into<String>) -> Self {
        Self::NotAMember { room: room.into() }
    }

    /// Create a new duplicate room error.
    pub fn duplicate_room(room: impl Into<String>) -> Self {
        Self::DuplicateRoom { room: room.into() }
    }

    /// Create a new handler error.
    pub fn handler(room: impl Into<String>, hook: HandlerHook, reason: impl Into<String>) -> Self {
        Self::Handler {
            room: room.into(),
            hook,
            reason: reason.into(),
        }
    }

    /// Create a new "not a WebSocket request" error.
    pub fn not_websocket(reason: impl Into<String>) -> Self {
        Self::NotWebSocketRequest {
            reason: reason.into(),
        }
    }

    /// Create a new handshake failed error.
    pub fn handshake_failed(reason: impl Into<String>) -> Self {
        Self::HandshakeFailed(reason.into())
    }

    /// Create a new connection closed error.
    pub fn connection_closed(reason: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            reason: reason.into(),
        }
    }

    /// Create a new send failed error.
    pub fn send_failed(reason: impl Into<String>) -> Self {
        Self::SendFailed(reason.into())
    }

    /// Create a new connection limit reached error.
    pub fn connection_limit(reason: impl Into<String>) -> Self {
        Self::ConnectionLimitReached(reason.into())
    }

    /// The text carried by the `{"error": ...}` frame sent to the client.
    pub fn client_message(&self) -> String {
        match self {
            Self::Protocol(_) => "JSON expected.".to_string(),
            Self::Validation(reason) => reason.clone(),
            Self::RoomNotFound { room } => format!("The room \"{room}\" does not exist."),
            Self::NotAMember { room } => format!("You are not in the room \"{room}\"."),
            other => other.to_string(),
        }
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Protocol(_) => "protocol",
            Self::Validation(_) => "validation",
            Self::RoomNotFound { .. } => "room_not_found",
            Self::NotAMember { .. } => "not_a_member",
            Self::DuplicateRoom { .. } => "duplicate_room",
            Self::Handler { .. } => "handler",
            Self::NotWebSocketRequest { .. } => "not_websocket",
            Self::HandshakeFailed(_) => "handshake",
            Self::ConnectionClosed { .. } => "closed",
            Self::SendFailed(_) => "send_failed",
            Self::EncodeFailed(_) => "encode",
            Self::ConnectionLimitReached(_) => "limit",
            Self::Io(_) => "io",
            Self::Tungstenite(_) => "tungstenite",
            Self::Hyper(_) => "hyper",
        }
    }

    /// Check if this error is reported back to the originating connection.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Protocol(_)
                | Self::Validation(_)
                | Self::RoomNotFound { .. }
                | Self::NotAMember { .. }
        )
    }
}

/// The room handler hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerHook {
    /// Invoked before a message is broadcast into the room.
    Message,
    /// Invoked after a connection joins.
    Subscribe,
    /// Invoked after a connection leaves or disconnects.
    Unsubscribe,
}

impl HandlerHook {
    /// Label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "on_message",
            Self::Subscribe => "on_subscribe",
            Self::Unsubscribe => "on_unsubscribe",
        }
    }
}

impl fmt::Display for HandlerHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Close code for WebSocket connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CloseCode {
    /// Normal closure (1000).
    Normal = 1000,
    /// Going away (1001).
    GoingAway = 1001,
    /// Protocol error (1002).
    Protocol = 1002,
    /// Policy violation (1008).
    PolicyViolation = 1008,
    /// Internal error (1011).
    InternalError = 1011,
    /// Try again later (1013).
    TryAgainLater = 1013,
}

impl CloseCode {
    /// Convert from a u16 code.
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::Normal),
            1001 => Some(Self::GoingAway),
            1002 => Some(Self::Protocol),
            1008 => Some(Self::PolicyViolation),
            1011 => Some(Self::InternalError),
            1013 => Some(Self::TryAgainLater),
            _ => None,
        }
    }

    /// Get the u16 value of this close code.
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Normal => "Normal",
            Self::GoingAway => "GoingAway",
            Self::Protocol => "Protocol",
            Self::PolicyViolation => "PolicyViolation",
            Self::InternalError => "InternalError",
            Self::TryAgainLater => "TryAgainLater",
        };
        write!(f, "{} ({})", name, self.as_u16())
    }
}
