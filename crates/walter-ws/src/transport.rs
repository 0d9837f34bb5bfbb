//! The WebSocket transport.
//!
//! One task accepts TCP connections and serves HTTP/1.1 on each with upgrade
//! support. Every upgraded socket then gets a reader task, which feeds the
//! [`LifecycleManager`], and a writer task, which drains the connection's
//! outbound queue into the socket.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use http::{Request, Response, StatusCode};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, instrument, warn};

use crate::connection::{ChannelConnection, ConnectionId, ConnectionRef};
use crate::error::CloseCode;
use crate::lifecycle::LifecycleManager;
use crate::manager::RoomManager;
use crate::message::Message;
use crate::upgrade::{complete_upgrade, upgrade_response, UpgradeBody};

pub(crate) async fn accept_loop(
    manager: Arc<RoomManager>,
    listener: TcpListener,
    mut shutdown: broadcast::Receiver<()>,
) {
    if manager.is_shutdown() {
        return;
    }

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        let manager = Arc::clone(&manager);
                        tokio::spawn(async move {
                            if let Err(e) = serve_http(manager, stream, peer).await {
                                debug!(peer = %peer, error = %e, "HTTP connection error");
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                    }
                }
            }

            _ = shutdown.recv() => {
                info!("Shutdown signal received, stopping listener");
                break;
            }
        }
    }
}

async fn serve_http(
    manager: Arc<RoomManager>,
    stream: TcpStream,
    peer: SocketAddr,
) -> Result<(), hyper::Error> {
    let io = TokioIo::new(stream);

    let service = service_fn(move |mut req: Request<Incoming>| {
        let manager = Arc::clone(&manager);
        async move { Ok::<_, Infallible>(handle_request(manager, &mut req, peer)) }
    });

    http1::Builder::new()
        .serve_connection(io, service)
        .with_upgrades()
        .await
}

fn handle_request(
    manager: Arc<RoomManager>,
    req: &mut Request<Incoming>,
    peer: SocketAddr,
) -> Response<UpgradeBody> {
    let response = upgrade_response(req);
    if response.status() != StatusCode::SWITCHING_PROTOCOLS {
        return response;
    }

    let on_upgrade = hyper::upgrade::on(req);
    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => {
                let ws = complete_upgrade(TokioIo::new(upgraded)).await;
                serve_socket(manager, ws, Some(peer)).await;
            }
            Err(e) => warn!(peer = %peer, error = %e, "WebSocket upgrade failed"),
        }
    });

    response
}

/// Run an upgraded WebSocket through the room manager until it closes.
///
/// Hosts that perform the HTTP upgrade themselves can hand the resulting
/// stream to this function instead of using [`RoomManager::initialize`].
#[instrument(skip_all, fields(peer = ?peer))]
pub async fn serve_socket<S>(
    manager: Arc<RoomManager>,
    ws: WebSocketStream<S>,
    peer: Option<SocketAddr>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut shutdown = manager.shutdown_receiver();
    let config = manager.config().clone();
    let (conn, outbound) =
        ChannelConnection::with_peer(ConnectionId::new(), config.outbound_buffer, peer);
    let handle: ConnectionRef = conn.clone();
    let id = handle.id();

    let (sink, mut stream) = ws.split();
    let mut writer = tokio::spawn(write_loop(sink, outbound, id));
    let lifecycle = manager.lifecycle();

    let close_frame = match lifecycle.open(&handle) {
        Ok(()) => read_loop(lifecycle, &handle, &mut stream, &mut shutdown).await,
        Err(e) => {
            warn!(connection_id = %id, error = %e, "Connection refused");
            if manager.is_shutdown() {
                Message::close(CloseCode::GoingAway, "server shutting down")
            } else {
                Message::close(CloseCode::TryAgainLater, "too many connections")
            }
        }
    };

    lifecycle.close(&handle).await;
    conn.send_close(close_frame);
    drop(stream);

    if tokio::time::timeout(config.flush_timeout, &mut writer)
        .await
        .is_err()
    {
        debug!(connection_id = %id, "Writer did not flush in time, aborting");
        writer.abort();
    }
}

/// Feed inbound frames to the lifecycle. Returns the close frame to answer
/// with.
async fn read_loop<S>(
    lifecycle: &LifecycleManager,
    conn: &ConnectionRef,
    stream: &mut SplitStream<WebSocketStream<S>>,
    shutdown: &mut broadcast::Receiver<()>,
) -> Message
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(frame)) => {
                        let msg = Message::from(frame);
                        if msg.is_close() {
                            debug!(
                                connection_id = %conn.id(),
                                code = ?msg.close_frame().map(|f| f.code),
                                "Client closed connection"
                            );
                            return Message::close(CloseCode::Normal, "");
                        }
                        lifecycle.frame(conn, &msg).await;
                    }
                    Some(Err(e)) => {
                        debug!(connection_id = %conn.id(), error = %e, "WebSocket read error");
                        return Message::close(CloseCode::Protocol, "protocol error");
                    }
                    None => return Message::close(CloseCode::Normal, ""),
                }
            }

            _ = shutdown.recv() => {
                return Message::close(CloseCode::GoingAway, "server shutting down");
            }
        }
    }
}

/// Drain the outbound queue into the socket. Stops after a close frame or the
/// first write error.
async fn write_loop<S>(
    mut sink: SplitSink<WebSocketStream<S>, tungstenite::Message>,
    mut outbound: mpsc::Receiver<Message>,
    id: ConnectionId,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(msg) = outbound.recv().await {
        let closing = msg.is_close();
        if let Err(e) = sink.send(msg.into()).await {
            debug!(connection_id = %id, error = %e, "WebSocket write failed");
            break;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}
