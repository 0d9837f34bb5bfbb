//! Periodic status broadcast.
//!
//! Every interval the server pushes `{"status": <stats>}` to every
//! registered connection.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use walter_ws::RoomManager;

/// Build the status frame body for the manager's current stats.
pub fn status_frame(manager: &RoomManager) -> serde_json::Value {
    json!({ "status": manager.stats() })
}

/// Push a status frame every `period` until the manager shuts down.
pub async fn status_loop(manager: Arc<RoomManager>, period: Duration) {
    let mut shutdown = manager.shutdown_receiver();
    if manager.is_shutdown() {
        return;
    }
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if manager.is_shutdown() {
                    break;
                }
                match manager.broadcast(&status_frame(&manager), None) {
                    Ok(report) => debug!(delivered = report.delivered, "Status pushed"),
                    Err(e) => warn!(error = %e, "Status push failed"),
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use walter_ws::{ChannelConnection, ConnectionId, ConnectionRef, RoomManagerConfig};

    #[tokio::test(start_paused = true)]
    async fn test_status_loop_pushes_until_shutdown() {
        let manager = RoomManager::new(RoomManagerConfig::default());
        let (conn, mut rx) = ChannelConnection::new(ConnectionId::new(), 8);
        let conn: ConnectionRef = conn;
        manager.lifecycle().open(&conn).unwrap();

        let task = tokio::spawn(status_loop(Arc::clone(&manager), Duration::from_secs(30)));

        tokio::time::sleep(Duration::from_secs(31)).await;
        let msg = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(msg.as_text().unwrap()).unwrap();
        assert_eq!(value["status"]["active_connections"], 1);
        assert!(value["status"]["uptime_secs"].is_u64());

        manager.shutdown();
        task.await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
