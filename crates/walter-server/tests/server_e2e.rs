//! Runs the configured server and talks to it over a real socket.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WireMessage;
use walter_config::WalterConfig;
use walter_server::WalterServer;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_configured_rooms_status_push_and_shutdown() {
    let mut config = WalterConfig::builder().rooms(["lobby", "chat"]).build();
    config.server.status_interval_secs = Some(1);
    config.server.shutdown_timeout_secs = 2;

    let server = WalterServer::new(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(server.serve(listener, async {
        let _ = stop_rx.await;
    }));

    let (mut client, _) = connect_async(format!("ws://{addr}/")).await.unwrap();
    client
        .send(WireMessage::text(
            json!({"action": "join", "room": "chat"}).to_string(),
        ))
        .await
        .unwrap();

    let mut joined = false;
    let mut status = None;
    while !joined || status.is_none() {
        let frame = tokio::time::timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for frames")
            .unwrap()
            .unwrap();
        let value: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        if value == json!({"success": "You joined the \"chat\" room"}) {
            joined = true;
        } else if value.get("status").is_some() {
            status = Some(value);
        } else {
            panic!("unexpected frame: {value}");
        }
    }
    let status = status.unwrap();
    assert_eq!(status["status"]["active_connections"], 1);
    assert_eq!(status["status"]["rooms"], 2);

    stop_tx.send(()).unwrap();

    let close_code = loop {
        match tokio::time::timeout(WAIT, client.next()).await.unwrap() {
            Some(Ok(WireMessage::Close(Some(frame)))) => break u16::from(frame.code),
            Some(Ok(_)) => continue,
            other => panic!("expected a close frame, got {other:?}"),
        }
    };
    assert_eq!(close_code, 1001);

    tokio::time::timeout(WAIT, running)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
}
