//! The shared membership table.
//!
//! Both sides of the room relation live in one [`Membership`] value behind a
//! single mutex:
//!
//! ```text
//! connection ∈ rooms[r].members  ⇔  r ∈ connections[connection].rooms
//! ```
//!
//! [`Membership::link`] and [`Membership::unlink`] are the only operations
//! that touch one side of the relation, and they always touch both. The lock
//! is never held across an `.await`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::connection::{ConnectionId, ConnectionRef};
use crate::error::{WsError, WsResult};
use crate::handlers::RoomHandlers;

pub(crate) type SharedMembership = Arc<Mutex<Membership>>;

pub(crate) struct ConnectionEntry {
    pub(crate) handle: ConnectionRef,
    pub(crate) rooms: HashSet<String>,
    pub(crate) registered_at: Instant,
}

pub(crate) struct RoomEntry {
    pub(crate) members: HashSet<ConnectionId>,
    pub(crate) handlers: RoomHandlers,
    pub(crate) created_at: Instant,
}

#[derive(Default)]
pub(crate) struct Membership {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    rooms: HashMap<String, RoomEntry>,
}

impl Membership {
    pub(crate) fn shared() -> SharedMembership {
        Arc::new(Mutex::new(Self::default()))
    }

    pub(crate) fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub(crate) fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub(crate) fn connection(&self, id: &ConnectionId) -> Option<&ConnectionEntry> {
        self.connections.get(id)
    }

    pub(crate) fn connections(&self) -> impl Iterator<Item = &ConnectionEntry> {
        self.connections.values()
    }

    pub(crate) fn room(&self, name: &str) -> Option<&RoomEntry> {
        self.rooms.get(name)
    }

    pub(crate) fn rooms(&self) -> impl Iterator<Item = (&String, &RoomEntry)> {
        self.rooms.iter()
    }

    /// Returns `false` if the identity is already present.
    pub(crate) fn insert_connection(&mut self, handle: ConnectionRef) -> bool {
        let id = handle.id();
        if self.connections.contains_key(&id) {
            return false;
        }
        self.connections.insert(
            id,
            ConnectionEntry {
                handle,
                rooms: HashSet::new(),
                registered_at: Instant::now(),
            },
        );
        self.check_consistency();
        true
    }

    /// Remove a connection, first clearing any memberships it still holds.
    ///
    /// Returns the handle and the names of the rooms that had to be cleared.
    pub(crate) fn remove_connection(
        &mut self,
        id: &ConnectionId,
    ) -> Option<(ConnectionRef, Vec<String>)> {
        let stale: Vec<String> = self.connections.get(id)?.rooms.iter().cloned().collect();
        for room in &stale {
            self.unlink(id, room);
        }
        let entry = self.connections.remove(id)?;
        self.check_consistency();
        Some((entry.handle, stale))
    }

    /// Returns `false` if a room with this name exists.
    pub(crate) fn insert_room(&mut self, name: &str, handlers: RoomHandlers) -> bool {
        if self.rooms.contains_key(name) {
            return false;
        }
        self.rooms.insert(
            name.to_string(),
            RoomEntry {
                members: HashSet::new(),
                handlers,
                created_at: Instant::now(),
            },
        );
        true
    }

    /// Remove a room, unlinking every member. Returns the evicted handles.
    pub(crate) fn remove_room(&mut self, name: &str) -> Option<Vec<ConnectionRef>> {
        let members: Vec<ConnectionId> = self.rooms.get(name)?.members.iter().copied().collect();
        let mut evicted = Vec::with_capacity(members.len());
        for id in &members {
            if let Some(entry) = self.connections.get(id) {
                evicted.push(Arc::clone(&entry.handle));
            }
            self.unlink(id, name);
        }
        self.rooms.remove(name);
        self.check_consistency();
        Some(evicted)
    }

    /// Add `id` to `room` on both sides.
    ///
    /// Returns `Ok(false)` when the connection was already a member.
    pub(crate) fn link(&mut self, id: &ConnectionId, room: &str) -> WsResult<bool> {
        let Some(entry) = self.rooms.get_mut(room) else {
            return Err(WsError::room_not_found(room));
        };
        let Some(conn) = self.connections.get_mut(id) else {
            return Err(WsError::connection_closed(format!(
                "connection {id} is not registered"
            )));
        };

        let added = entry.members.insert(*id);
        conn.rooms.insert(room.to_string());
        self.check_consistency();
        Ok(added)
    }

    /// Remove `id` from `room` on both sides. Returns whether it was a member.
    pub(crate) fn unlink(&mut self, id: &ConnectionId, room: &str) -> bool {
        let was_member = self
            .rooms
            .get_mut(room)
            .is_some_and(|entry| entry.members.remove(id));
        let was_listed = self
            .connections
            .get_mut(id)
            .is_some_and(|conn| conn.rooms.remove(room));
        debug_assert_eq!(was_member, was_listed, "membership sides disagreed");
        self.check_consistency();
        was_member || was_listed
    }

    pub(crate) fn is_member(&self, id: &ConnectionId, room: &str) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|entry| entry.members.contains(id))
    }

    /// Snapshot of a room's member handles.
    pub(crate) fn member_handles(&self, room: &str) -> Option<Vec<ConnectionRef>> {
        let entry = self.rooms.get(room)?;
        Some(
            entry
                .members
                .iter()
                .filter_map(|id| self.connections.get(id))
                .map(|conn| Arc::clone(&conn.handle))
                .collect(),
        )
    }

    /// Snapshot of every registered handle.
    pub(crate) fn handles(&self) -> Vec<ConnectionRef> {
        self.connections
            .values()
            .map(|conn| Arc::clone(&conn.handle))
            .collect()
    }

    #[cfg(debug_assertions)]
    fn check_consistency(&self) {
        for (name, room) in &self.rooms {
            for id in &room.members {
                let listed = self
                    .connections
                    .get(id)
                    .is_some_and(|conn| conn.rooms.contains(name));
                assert!(listed, "{id} is in {name} but does not list it");
            }
        }
        for (id, conn) in &self.connections {
            for name in &conn.rooms {
                let member = self
                    .rooms
                    .get(name)
                    .is_some_and(|room| room.members.contains(id));
                assert!(member, "{id} lists {name} but is not a member");
            }
        }
    }

    #[cfg(not(debug_assertions))]
    #[inline]
    fn check_consistency(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ChannelConnection;

    fn conn() -> ConnectionRef {
        let (conn, _rx) = ChannelConnection::new(ConnectionId::new(), 4);
        conn
    }

    #[test]
    fn test_link_updates_both_sides() {
        let mut table = Membership::default();
        let c = conn();
        table.insert_connection(Arc::clone(&c));
        table.insert_room("lobby", RoomHandlers::new());

        assert!(table.link(&c.id(), "lobby").unwrap());
        assert!(!table.link(&c.id(), "lobby").unwrap());
        assert!(table.is_member(&c.id(), "lobby"));
        assert!(table.connection(&c.id()).unwrap().rooms.contains("lobby"));
        assert_eq!(table.room("lobby").unwrap().members.len(), 1);

        assert!(table.unlink(&c.id(), "lobby"));
        assert!(!table.unlink(&c.id(), "lobby"));
        assert!(!table.is_member(&c.id(), "lobby"));
        assert!(table.connection(&c.id()).unwrap().rooms.is_empty());
    }

    #[test]
    fn test_link_requires_room_and_connection() {
        let mut table = Membership::default();
        let c = conn();

        table.insert_room("lobby", RoomHandlers::new());
        assert!(matches!(
            table.link(&c.id(), "lobby"),
            Err(WsError::ConnectionClosed { .. })
        ));

        table.insert_connection(Arc::clone(&c));
        assert!(matches!(
            table.link(&c.id(), "ghost"),
            Err(WsError::RoomNotFound { .. })
        ));
        assert!(table.connection(&c.id()).unwrap().rooms.is_empty());
    }

    #[test]
    fn test_duplicate_inserts_are_rejected() {
        let mut table = Membership::default();
        let c = conn();
        assert!(table.insert_connection(Arc::clone(&c)));
        assert!(!table.insert_connection(Arc::clone(&c)));
        assert_eq!(table.connection_count(), 1);

        assert!(table.insert_room("lobby", RoomHandlers::new()));
        assert!(!table.insert_room("lobby", RoomHandlers::new()));
        assert_eq!(table.room_count(), 1);
    }

    #[test]
    fn test_remove_connection_clears_stale_memberships() {
        let mut table = Membership::default();
        let c = conn();
        table.insert_connection(Arc::clone(&c));
        table.insert_room("a", RoomHandlers::new());
        table.insert_room("b", RoomHandlers::new());
        table.link(&c.id(), "a").unwrap();
        table.link(&c.id(), "b").unwrap();

        let (_, mut stale) = table.remove_connection(&c.id()).unwrap();
        stale.sort();
        assert_eq!(stale, vec!["a".to_string(), "b".to_string()]);
        assert!(table.room("a").unwrap().members.is_empty());
        assert!(table.room("b").unwrap().members.is_empty());
        assert!(table.remove_connection(&c.id()).is_none());
    }

    #[test]
    fn test_remove_room_evicts_members() {
        let mut table = Membership::default();
        let c1 = conn();
        let c2 = conn();
        for c in [&c1, &c2] {
            table.insert_connection(Arc::clone(c));
        }
        table.insert_room("lobby", RoomHandlers::new());
        table.link(&c1.id(), "lobby").unwrap();
        table.link(&c2.id(), "lobby").unwrap();

        let evicted = table.remove_room("lobby").unwrap();
        assert_eq!(evicted.len(), 2);
        assert!(table.room("lobby").is_none());
        assert!(table.connection(&c1.id()).unwrap().rooms.is_empty());
        assert!(table.connection(&c2.id()).unwrap().rooms.is_empty());
        assert!(table.remove_room("lobby").is_none());
    }

    #[test]
    fn test_member_handles_snapshot() {
        let mut table = Membership::default();
        let c1 = conn();
        let c2 = conn();
        table.insert_connection(Arc::clone(&c1));
        table.insert_connection(Arc::clone(&c2));
        table.insert_room("lobby", RoomHandlers::new());
        table.link(&c1.id(), "lobby").unwrap();

        let members = table.member_handles("lobby").unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id(), c1.id());
        assert!(table.member_handles("ghost").is_none());
        assert_eq!(table.handles().len(), 2);
    }
}
