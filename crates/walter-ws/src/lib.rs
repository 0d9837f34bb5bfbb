//! Room-based WebSocket publish/subscribe for Walter.
//!
//! This crate tracks which WebSocket connections exist, which named rooms
//! exist and who belongs to which room. Clients drive it with small JSON
//! frames; the host creates rooms, binds handlers to them and broadcasts.
//!
//! # Features
//!
//! - **RFC 6455 upgrade** over hyper, sockets driven by `tokio-tungstenite`
//! - **Rooms** with optional `on_message`, `on_subscribe` and
//!   `on_unsubscribe` handlers whose failures never reach the client loop
//! - **Consistent membership** kept in one table holding both sides of the
//!   relation
//! - **Non-blocking fan-out** through bounded per-connection queues
//! - **Connection limits** and **graceful shutdown** with `1001` close frames
//!
//! # Example
//!
//! ```no_run
//! use walter_ws::{Connection, Message, RoomHandlers, RoomManager, RoomManagerConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = RoomManager::new(RoomManagerConfig::default());
//!
//! manager.create_room("lobby", RoomHandlers::new())?;
//! manager.create_room(
//!     "chat",
//!     RoomHandlers::new()
//!         .on_message(|message, sender| async move {
//!             tracing::info!(from = %sender.id(), %message, "chat message");
//!             Ok(())
//!         })
//!         .on_subscribe(|conn| async move {
//!             conn.send(Message::text(r#"{"success":"Welcome to chat"}"#))?;
//!             Ok(())
//!         }),
//! )?;
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! if let Some(server) = manager.initialize(listener) {
//!     server.await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Wire protocol
//!
//! ```text
//! client → server   {"action": "join" | "leave", "room": "<name>"}
//!                   {"action": "message", "room": "<name>", "data": <any>}
//!
//! server → client   {"success": "You joined the \"<name>\" room"}
//!                   {"message": "You have left the room \"<name>\""}
//!                   {"room": "<name>", "message": <any>}
//!                   {"error": "<reason>"}
//!                   {"deletion": "Room \"<name>\" has been deleted"}
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ TcpListener ──► hyper http1 ──► upgrade_response() ──► 101       │
//! │                                      │                           │
//! │                                      ▼                           │
//! │              serve_socket(): reader task ──► LifecycleManager    │
//! │                              writer task ◄── outbound queue      │
//! │                                      │                           │
//! │   open ──► ConnectionRegistry        │ frame                     │
//! │                                      ▼                           │
//! │                            MessageDispatcher                     │
//! │                                      │                           │
//! │                                      ▼                           │
//! │                 RoomDirectory ──► BroadcastEngine                │
//! │                                                                  │
//! │   close ──► leave every room (disconnect) ──► unregister         │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod broadcast;
pub mod config;
pub mod connection;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod manager;
mod membership;
pub mod message;
pub mod protocol;
pub mod registry;
pub mod transport;
pub mod upgrade;

// Re-exports for convenience
pub use broadcast::{BroadcastEngine, DeliveryReport};
pub use config::RoomManagerConfig;
pub use connection::{ChannelConnection, Connection, ConnectionId, ConnectionRef, ConnectionStatus};
pub use directory::{RoomDirectory, RoomInfo};
pub use dispatcher::{DispatchOutcome, MessageDispatcher};
pub use error::{CloseCode, HandlerHook, WsError, WsResult};
pub use handlers::{HandlerFuture, HandlerResult, RoomHandlers};
pub use lifecycle::LifecycleManager;
pub use manager::{ManagerStats, RoomManager};
pub use message::{CloseFrame, Message};
pub use protocol::{parse_action, Action, OutboundFrame};
pub use registry::{ConnectionInfo, ConnectionRegistry, RegistryCounters};
pub use transport::serve_socket;
pub use upgrade::{
    complete_upgrade, compute_accept_key, is_websocket_request, upgrade_response,
    validate_upgrade_request,
};
