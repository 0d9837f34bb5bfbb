//! The room server: configuration in, running listener out.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tokio::net::TcpListener;
use tracing::{info, warn};
use walter_config::{ServerConfig, WalterConfig};
use walter_ws::{RoomHandlers, RoomManager, RoomManagerConfig};

use crate::status::status_loop;

const DRAIN_POLL: Duration = Duration::from_millis(50);

/// A configured room server.
///
/// Construction creates the room manager and every configured room; nothing
/// listens until [`WalterServer::run`] or [`WalterServer::serve`].
pub struct WalterServer {
    config: WalterConfig,
    manager: Arc<RoomManager>,
}

impl WalterServer {
    /// Build the manager and create the configured rooms.
    pub fn new(config: WalterConfig) -> anyhow::Result<Self> {
        let manager = RoomManager::new(manager_config(&config.server));
        for room in &config.rooms {
            manager
                .create_room(room, RoomHandlers::new())
                .with_context(|| format!("failed to create room \"{room}\""))?;
        }
        Ok(Self { config, manager })
    }

    /// The room manager, for hosts that bind handlers or broadcast.
    pub fn manager(&self) -> &Arc<RoomManager> {
        &self.manager
    }

    /// The configuration the server was built from.
    pub fn config(&self) -> &WalterConfig {
        &self.config
    }

    /// Bind the configured address and serve until `shutdown` completes.
    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = &self.config.server.bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` completes, then
    /// close every connection with `1001` and wait for them to drain.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr().context("listener has no local address")?;
        let Some(acceptor) = self.manager.initialize(listener) else {
            bail!("room manager is already serving");
        };
        info!(
            addr = %addr,
            rooms = ?self.config.rooms,
            max_connections = self.config.server.max_connections,
            "Walter room server listening"
        );

        let status = self.config.server.status_interval_secs.map(|secs| {
            tokio::spawn(status_loop(
                Arc::clone(&self.manager),
                Duration::from_secs(secs),
            ))
        });

        shutdown.await;

        let open = self.manager.shutdown();
        info!(connections = open, "Draining connections");

        let deadline = Duration::from_secs(self.config.server.shutdown_timeout_secs);
        if tokio::time::timeout(deadline, drain(&self.manager))
            .await
            .is_err()
        {
            warn!(
                remaining = self.manager.registry().len(),
                "Shutdown timeout elapsed with connections still open"
            );
        }

        if let Err(e) = acceptor.await {
            warn!(error = %e, "Accept loop ended abnormally");
        }
        if let Some(status) = status {
            if let Err(e) = status.await {
                warn!(error = %e, "Status task ended abnormally");
            }
        }

        info!(stats = ?self.manager.stats(), "Walter room server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for WalterServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalterServer")
            .field("bind_addr", &self.config.server.bind_addr)
            .field("manager", &self.manager)
            .finish()
    }
}

/// Map the server section onto the room manager's settings.
pub fn manager_config(server: &ServerConfig) -> RoomManagerConfig {
    RoomManagerConfig::new()
        .max_connections(server.max_connections)
        .outbound_buffer(server.outbound_buffer)
        .flush_timeout(Duration::from_millis(server.flush_timeout_ms))
}

async fn drain(manager: &RoomManager) {
    while !manager.registry().is_empty() {
        tokio::time::sleep(DRAIN_POLL).await;
    }
}
