//! Inbound frame dispatch.

use std::sync::Arc;

use tracing::debug;

use crate::broadcast::{BroadcastEngine, DeliveryReport};
use crate::connection::ConnectionRef;
use crate::directory::RoomDirectory;
use crate::error::WsError;
use crate::message::Message;
use crate::protocol::{parse_action, Action, OutboundFrame};

/// What a dispatched frame did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The connection joined the room.
    Joined,
    /// The leave ran; `was_member` is `false` when it was a no-op.
    Left {
        /// Whether the connection had been a member.
        was_member: bool,
    },
    /// The message was published.
    Published(DeliveryReport),
    /// The frame was refused and an error frame was sent back.
    Rejected {
        /// The error class, as in [`WsError::kind`].
        kind: &'static str,
    },
}

impl DispatchOutcome {
    /// Label for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Joined | Self::Left { .. } | Self::Published(_) => "ok",
            Self::Rejected { kind } => *kind,
        }
    }
}

/// Routes inbound frames to room operations.
///
/// [`MessageDispatcher::handle`] never fails: every error becomes a
/// best-effort `{"error": ...}` frame to the originating connection and a
/// [`DispatchOutcome::Rejected`].
#[derive(Clone)]
pub struct MessageDispatcher {
    directory: Arc<RoomDirectory>,
}

impl MessageDispatcher {
    pub(crate) fn new(directory: Arc<RoomDirectory>) -> Self {
        Self { directory }
    }

    /// Parse and execute one inbound data frame.
    pub async fn handle(&self, connection: &ConnectionRef, msg: &Message) -> DispatchOutcome {
        let action = match msg.payload_text() {
            Some(text) => parse_action(&text),
            None => Err(WsError::protocol("payload is not UTF-8 text")),
        };

        let (name, result) = match action {
            Ok(action) => (action.name(), self.execute(connection, action).await),
            Err(e) => ("invalid", Err(e)),
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!(
                    connection_id = %connection.id(),
                    action = name,
                    error = %e,
                    "Rejected frame"
                );
                BroadcastEngine::send_frame(connection, &OutboundFrame::error(&e));
                DispatchOutcome::Rejected { kind: e.kind() }
            }
        };

        walter_telemetry::metrics::record_frame(name, outcome.as_str());
        outcome
    }

    async fn execute(
        &self,
        connection: &ConnectionRef,
        action: Action,
    ) -> Result<DispatchOutcome, WsError> {
        match action {
            Action::Join { room } => {
                self.directory.join(connection, &room).await?;
                Ok(DispatchOutcome::Joined)
            }
            Action::Leave { room } => {
                let was_member = self.directory.leave(connection, &room, false).await;
                Ok(DispatchOutcome::Left { was_member })
            }
            Action::Publish { room, data } => {
                let report = self.directory.publish(connection, &room, data).await?;
                Ok(DispatchOutcome::Published(report))
            }
        }
    }
}

impl std::fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageDispatcher").finish_non_exhaustive()
    }
}
