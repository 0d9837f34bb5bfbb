//! The room directory.
//!
//! Rooms are created and deleted by the host. Connections move in and out of
//! them through [`RoomDirectory::join`] and [`RoomDirectory::leave`], and
//! publish into them with [`RoomDirectory::publish`]. Every operation takes
//! what it needs from the membership table under the lock, releases it, and
//! only then runs handlers or sends.

use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info};

use crate::broadcast::{BroadcastEngine, DeliveryReport};
use crate::connection::ConnectionRef;
use crate::error::{HandlerHook, WsError, WsResult};
use crate::handlers::{invoke_isolated, RoomHandlers};
use crate::membership::SharedMembership;
use crate::protocol::OutboundFrame;

/// A point-in-time view of one room.
#[derive(Debug, Clone)]
pub struct RoomInfo {
    /// Room name.
    pub name: String,
    /// Number of members.
    pub members: usize,
    /// When the room was created.
    pub created_at: Instant,
}

/// Directory of named rooms.
pub struct RoomDirectory {
    table: SharedMembership,
    broadcaster: BroadcastEngine,
}

impl RoomDirectory {
    pub(crate) fn new(table: SharedMembership, broadcaster: BroadcastEngine) -> Self {
        Self { table, broadcaster }
    }

    /// Create an empty room bound to `handlers`.
    pub fn create_room(&self, name: &str, handlers: RoomHandlers) -> WsResult<()> {
        let mut table = self.table.lock();
        if !table.insert_room(name, handlers) {
            return Err(WsError::duplicate_room(name));
        }
        let total = table.room_count();
        drop(table);

        walter_telemetry::metrics::set_active_rooms(total);
        info!(room = %name, "Room created");
        Ok(())
    }

    /// Delete a room, evicting every member.
    ///
    /// Each open member receives a deletion notice; no unsubscribe handler
    /// runs. Returns `false` if no such room existed.
    pub fn delete_room(&self, name: &str) -> bool {
        let mut table = self.table.lock();
        let Some(evicted) = table.remove_room(name) else {
            return false;
        };
        let total = table.room_count();
        drop(table);

        let notice = OutboundFrame::deletion(name);
        for conn in &evicted {
            BroadcastEngine::send_frame(conn, &notice);
        }

        walter_telemetry::metrics::set_active_rooms(total);
        info!(room = %name, evicted = evicted.len(), "Room deleted");
        true
    }

    /// Add `connection` to the room.
    ///
    /// Runs `on_subscribe` when bound, otherwise sends the join
    /// acknowledgement. A failing handler is logged and does not undo the
    /// join. Joining a room twice leaves the state unchanged and runs the
    /// subscribe step again.
    pub async fn join(&self, connection: &ConnectionRef, name: &str) -> WsResult<()> {
        let id = connection.id();
        let (added, on_subscribe) = {
            let mut table = self.table.lock();
            let added = table.link(&id, name)?;
            let handler = table
                .room(name)
                .and_then(|room| room.handlers.on_subscribe.clone());
            (added, handler)
        };

        debug!(connection_id = %id, room = %name, rejoin = !added, "Joined room");

        match on_subscribe {
            Some(handler) => {
                let conn = connection.clone();
                let _ = invoke_isolated(name, HandlerHook::Subscribe, move || handler(conn)).await;
            }
            None => BroadcastEngine::send_frame(connection, &OutboundFrame::joined(name)),
        }
        Ok(())
    }

    /// Remove `connection` from the room.
    ///
    /// A no-op returning `false` when the room does not exist or the
    /// connection is not a member. Otherwise runs `on_unsubscribe` when bound;
    /// without one, an explicit leave is answered with a notice and a
    /// disconnect is silent.
    pub async fn leave(&self, connection: &ConnectionRef, name: &str, is_disconnect: bool) -> bool {
        let id = connection.id();
        let on_unsubscribe = {
            let mut table = self.table.lock();
            if !table.is_member(&id, name) {
                return false;
            }
            table.unlink(&id, name);
            table
                .room(name)
                .and_then(|room| room.handlers.on_unsubscribe.clone())
        };

        debug!(connection_id = %id, room = %name, is_disconnect, "Left room");

        match on_unsubscribe {
            Some(handler) => {
                let conn = connection.clone();
                let _ = invoke_isolated(name, HandlerHook::Unsubscribe, move || {
                    handler(conn, is_disconnect)
                })
                .await;
            }
            None if !is_disconnect => {
                BroadcastEngine::send_frame(connection, &OutboundFrame::left(name));
            }
            None => {}
        }
        true
    }

    /// Publish `message` from `sender` to the other members of the room.
    ///
    /// The recipient snapshot is taken when membership is checked, before
    /// `on_message` runs. A failing `on_message` is logged and the broadcast
    /// still happens.
    pub async fn publish(
        &self,
        sender: &ConnectionRef,
        name: &str,
        message: Value,
    ) -> WsResult<DeliveryReport> {
        let id = sender.id();
        let (recipients, on_message) = {
            let table = self.table.lock();
            let Some(room) = table.room(name) else {
                return Err(WsError::room_not_found(name));
            };
            if !room.members.contains(&id) {
                return Err(WsError::not_a_member(name));
            }
            let handler = room.handlers.on_message.clone();
            let recipients = table.member_handles(name).unwrap_or_default();
            (recipients, handler)
        };

        if let Some(handler) = on_message {
            let conn = sender.clone();
            let payload = message.clone();
            let _ = invoke_isolated(name, HandlerHook::Message, move || handler(payload, conn)).await;
        }

        let envelope = OutboundFrame::broadcast(name, message);
        let report = self
            .broadcaster
            .deliver_to(&recipients, &envelope, Some(id))?;
        debug!(
            connection_id = %id,
            room = %name,
            delivered = report.delivered,
            "Published to room"
        );
        Ok(report)
    }

    /// Check if a room exists.
    pub fn contains(&self, name: &str) -> bool {
        self.table.lock().room(name).is_some()
    }

    /// Snapshot of a room's members, or `None` if it does not exist.
    pub fn members(&self, name: &str) -> Option<Vec<ConnectionRef>> {
        self.table.lock().member_handles(name)
    }

    /// Names of every room, sorted.
    pub fn room_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.table.lock().rooms().map(|(n, _)| n.clone()).collect();
        names.sort();
        names
    }

    /// Snapshot of every room, sorted by name.
    pub fn rooms(&self) -> Vec<RoomInfo> {
        let mut rooms: Vec<RoomInfo> = self
            .table
            .lock()
            .rooms()
            .map(|(name, room)| RoomInfo {
                name: name.clone(),
                members: room.members.len(),
                created_at: room.created_at,
            })
            .collect();
        rooms.sort_by(|a, b| a.name.cmp(&b.name));
        rooms
    }

    /// Get the number of rooms.
    pub fn len(&self) -> usize {
        self.table.lock().room_count()
    }

    /// Check if there are no rooms.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for RoomDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomDirectory")
            .field("rooms", &self.room_names())
            .finish()
    }
}
