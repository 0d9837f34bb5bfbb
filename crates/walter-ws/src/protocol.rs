//! The room wire protocol.
//!
//! Inbound frames are JSON envelopes:
//!
//! ```text
//! { "action": "join" | "leave" | "message", "room": "<name>", "data": <any> }
//! ```
//!
//! Outbound frames are single-key objects, see [`OutboundFrame`].

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{WsError, WsResult};
use crate::message::Message;

/// A parsed inbound request.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Join a room.
    Join {
        /// Room name.
        room: String,
    },
    /// Leave a room.
    Leave {
        /// Room name.
        room: String,
    },
    /// Publish `data` to the other members of a room.
    Publish {
        /// Room name.
        room: String,
        /// Arbitrary JSON payload.
        data: Value,
    },
}

impl Action {
    /// The wire name of the action.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Leave { .. } => "leave",
            Self::Publish { .. } => "message",
        }
    }

    /// The room this action targets.
    pub fn room(&self) -> &str {
        match self {
            Self::Join { room } | Self::Leave { room } | Self::Publish { room, .. } => room,
        }
    }
}

/// Parse one inbound text frame.
///
/// Fails with [`WsError::Protocol`] when the text is not JSON and with
/// [`WsError::Validation`] when the envelope is missing a required field or
/// names an unknown action. Unrecognized fields are ignored.
pub fn parse_action(text: &str) -> WsResult<Action> {
    let value: Value = serde_json::from_str(text).map_err(|e| WsError::protocol(e.to_string()))?;

    let Value::Object(mut envelope) = value else {
        return Err(WsError::validation("Frame must be a JSON object."));
    };

    let action = match envelope.get("action") {
        Some(Value::String(action)) => action.clone(),
        Some(_) => return Err(WsError::validation("Field \"action\" must be a string.")),
        None => return Err(WsError::validation("Missing field \"action\".")),
    };

    match action.as_str() {
        "join" => Ok(Action::Join {
            room: required_room(&envelope)?,
        }),
        "leave" => Ok(Action::Leave {
            room: required_room(&envelope)?,
        }),
        "message" => {
            let room = required_room(&envelope)?;
            let data = envelope
                .remove("data")
                .ok_or_else(|| WsError::validation("Missing field \"data\"."))?;
            Ok(Action::Publish { room, data })
        }
        other => Err(WsError::validation(format!("Unknown action \"{other}\"."))),
    }
}

fn required_room(envelope: &Map<String, Value>) -> WsResult<String> {
    match envelope.get("room") {
        Some(Value::String(room)) => Ok(room.clone()),
        Some(_) => Err(WsError::validation("Field \"room\" must be a string.")),
        None => Err(WsError::validation("Missing field \"room\".")),
    }
}

/// Frames the server sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundFrame {
    /// Default join acknowledgement.
    Success {
        /// Human-readable confirmation.
        success: String,
    },
    /// Default leave notice.
    Notice {
        /// Human-readable notice.
        message: String,
    },
    /// A message published into a room.
    Broadcast {
        /// Room the message was published to.
        room: String,
        /// The published payload.
        message: Value,
    },
    /// A request failed.
    Error {
        /// Human-readable reason.
        error: String,
    },
    /// The room was deleted by the host.
    Deletion {
        /// Human-readable notice.
        deletion: String,
    },
}

impl OutboundFrame {
    /// Acknowledgement sent when no `on_subscribe` handler is bound.
    pub fn joined(room: &str) -> Self {
        Self::Success {
            success: format!("You joined the \"{room}\" room"),
        }
    }

    /// Notice sent on explicit leave when no `on_unsubscribe` handler is bound.
    pub fn left(room: &str) -> Self {
        Self::Notice {
            message: format!("You have left the room \"{room}\""),
        }
    }

    /// Envelope delivered to the other members of a room.
    pub fn broadcast(room: &str, message: Value) -> Self {
        Self::Broadcast {
            room: room.to_string(),
            message,
        }
    }

    /// Error frame for a client-facing failure.
    pub fn error(err: &WsError) -> Self {
        Self::Error {
            error: err.client_message(),
        }
    }

    /// Notice sent to every member of a deleted room.
    pub fn deletion(room: &str) -> Self {
        Self::Deletion {
            deletion: format!("Room \"{room}\" has been deleted"),
        }
    }

    /// Encode as a text message.
    pub fn to_message(&self) -> WsResult<Message> {
        Message::from_json(self)
    }
}
