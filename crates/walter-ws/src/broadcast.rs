//! Message fan-out.
//!
//! Every delivery works over a snapshot of recipients taken under the
//! membership lock; the lock is released before the first send. Each payload
//! is serialized once per call, closed or excluded recipients are skipped,
//! and a failed send to one recipient never affects the others.

use serde::Serialize;
use tracing::{debug, trace};

use crate::connection::{ConnectionId, ConnectionRef};
use crate::error::{WsError, WsResult};
use crate::membership::SharedMembership;
use crate::message::Message;
use crate::protocol::OutboundFrame;

/// Outcome of a fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Recipients the message was queued for.
    pub delivered: usize,
    /// Recipients that were excluded, not open, or whose queue refused the
    /// message.
    pub skipped: usize,
}

impl DeliveryReport {
    /// Total recipients considered.
    pub fn total(&self) -> usize {
        self.delivered + self.skipped
    }
}

/// Delivers messages to rooms, explicit recipient lists, or everyone.
#[derive(Clone)]
pub struct BroadcastEngine {
    table: SharedMembership,
}

impl BroadcastEngine {
    pub(crate) fn new(table: SharedMembership) -> Self {
        Self { table }
    }

    /// Deliver `message` to every member of `room` except `exclude`.
    pub fn deliver_to_room<T: Serialize + ?Sized>(
        &self,
        room: &str,
        message: &T,
        exclude: Option<ConnectionId>,
    ) -> WsResult<DeliveryReport> {
        let msg = Message::from_json(message)?;
        let recipients = self
            .table
            .lock()
            .member_handles(room)
            .ok_or_else(|| WsError::room_not_found(room))?;
        Ok(self.deliver_message(&recipients, &msg, exclude))
    }

    /// Deliver `message` to an explicit recipient snapshot.
    pub fn deliver_to<T: Serialize + ?Sized>(
        &self,
        recipients: &[ConnectionRef],
        message: &T,
        exclude: Option<ConnectionId>,
    ) -> WsResult<DeliveryReport> {
        let msg = Message::from_json(message)?;
        Ok(self.deliver_message(recipients, &msg, exclude))
    }

    /// Deliver `message` to every registered connection except `exclude`.
    pub fn broadcast_all<T: Serialize + ?Sized>(
        &self,
        message: &T,
        exclude: Option<ConnectionId>,
    ) -> WsResult<DeliveryReport> {
        let msg = Message::from_json(message)?;
        let recipients = self.table.lock().handles();
        Ok(self.deliver_message(&recipients, &msg, exclude))
    }

    /// Send `message` to a single connection.
    ///
    /// Returns `Ok(false)` without sending when the connection is not open.
    pub fn send_to<T: Serialize + ?Sized>(
        &self,
        connection: &ConnectionRef,
        message: &T,
    ) -> WsResult<bool> {
        if !connection.is_open() {
            return Ok(false);
        }
        let msg = Message::from_json(message)?;
        connection.send(msg)?;
        walter_telemetry::metrics::record_delivery("delivered");
        Ok(true)
    }

    /// Deliver an already encoded message to a recipient snapshot.
    pub fn deliver_message(
        &self,
        recipients: &[ConnectionRef],
        msg: &Message,
        exclude: Option<ConnectionId>,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for conn in recipients {
            let id = conn.id();
            if exclude == Some(id) || !conn.is_open() {
                report.skipped += 1;
                continue;
            }
            match conn.send(msg.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    debug!(connection_id = %id, error = %e, "Dropped delivery");
                    walter_telemetry::metrics::record_delivery("failed");
                    report.skipped += 1;
                }
            }
        }

        walter_telemetry::metrics::record_deliveries("delivered", report.delivered);
        trace!(
            delivered = report.delivered,
            skipped = report.skipped,
            "Fan-out complete"
        );
        report
    }

    /// Best-effort send of a protocol frame. Failures are logged and dropped.
    pub(crate) fn send_frame(connection: &ConnectionRef, frame: &OutboundFrame) {
        if !connection.is_open() {
            return;
        }
        let result = frame.to_message().and_then(|msg| connection.send(msg));
        if let Err(e) = result {
            debug!(connection_id = %connection.id(), error = %e, "Failed to send frame");
        }
    }
}

impl std::fmt::Debug for BroadcastEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastEngine")
            .field("connections", &self.table.lock().connection_count())
            .finish()
    }
}
