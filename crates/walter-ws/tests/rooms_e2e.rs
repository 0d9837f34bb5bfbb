//! End-to-end tests over real sockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message as WireMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use walter_ws::{RoomHandlers, RoomManager, RoomManagerConfig};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn start(config: RoomManagerConfig) -> (Arc<RoomManager>, SocketAddr) {
    let manager = RoomManager::new(config);
    manager.create_room("lobby", RoomHandlers::new()).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    assert!(manager.initialize(listener).is_some());
    (manager, addr)
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _response) = connect_async(format!("ws://{addr}/")).await.unwrap();
    client
}

async fn send(client: &mut Client, value: Value) {
    client
        .send(WireMessage::text(value.to_string()))
        .await
        .unwrap();
}

async fn next_frame(client: &mut Client) -> WireMessage {
    tokio::time::timeout(WAIT, client.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("stream ended")
        .expect("read error")
}

async fn next_json(client: &mut Client) -> Value {
    let frame = next_frame(client).await;
    serde_json::from_str(frame.to_text().unwrap()).unwrap()
}

async fn next_close_code(client: &mut Client) -> u16 {
    match next_frame(client).await {
        WireMessage::Close(Some(frame)) => u16::from(frame.code),
        other => panic!("expected a close frame, got {other:?}"),
    }
}

async fn wait_for_connections(manager: &RoomManager, count: usize) {
    tokio::time::timeout(WAIT, async {
        while manager.registry().len() != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection count never settled");
}

#[tokio::test]
async fn test_join_and_publish_between_clients() {
    let (manager, addr) = start(RoomManagerConfig::default()).await;
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;

    for client in [&mut alice, &mut bob] {
        send(client, json!({"action": "join", "room": "lobby"})).await;
        assert_eq!(
            next_json(client).await,
            json!({"success": "You joined the \"lobby\" room"})
        );
    }

    send(
        &mut alice,
        json!({"action": "message", "room": "lobby", "data": {"text": "hi"}}),
    )
    .await;
    assert_eq!(
        next_json(&mut bob).await,
        json!({"room": "lobby", "message": {"text": "hi"}})
    );

    // The sender gets nothing back; the next frame it sees answers this leave.
    send(&mut alice, json!({"action": "leave", "room": "lobby"})).await;
    assert_eq!(
        next_json(&mut alice).await,
        json!({"message": "You have left the room \"lobby\""})
    );

    manager.shutdown();
}

#[tokio::test]
async fn test_bad_frames_get_error_replies() {
    let (manager, addr) = start(RoomManagerConfig::default()).await;
    let mut client = connect(addr).await;

    client.send(WireMessage::text("not json")).await.unwrap();
    assert_eq!(next_json(&mut client).await, json!({"error": "JSON expected."}));

    send(&mut client, json!({"action": "bogus"})).await;
    assert_eq!(
        next_json(&mut client).await,
        json!({"error": "Unknown action \"bogus\"."})
    );

    send(&mut client, json!({"action": "join", "room": "ghost"})).await;
    assert_eq!(
        next_json(&mut client).await,
        json!({"error": "The room \"ghost\" does not exist."})
    );

    send(
        &mut client,
        json!({"action": "message", "room": "lobby", "data": 1}),
    )
    .await;
    assert_eq!(
        next_json(&mut client).await,
        json!({"error": "You are not in the room \"lobby\"."})
    );

    // The connection survives every error and can still join.
    send(&mut client, json!({"action": "join", "room": "lobby"})).await;
    assert_eq!(
        next_json(&mut client).await,
        json!({"success": "You joined the \"lobby\" room"})
    );
    assert_eq!(manager.directory().members("lobby").unwrap().len(), 1);

    manager.shutdown();
}

#[tokio::test]
async fn test_disconnect_cleans_up_membership() {
    let (manager, addr) = start(RoomManagerConfig::default()).await;
    let mut client = connect(addr).await;
    send(&mut client, json!({"action": "join", "room": "lobby"})).await;
    next_json(&mut client).await;
    assert_eq!(manager.directory().members("lobby").unwrap().len(), 1);

    client.close(None).await.unwrap();
    wait_for_connections(&manager, 0).await;

    assert!(manager.directory().members("lobby").unwrap().is_empty());
    assert_eq!(manager.stats().total_closed, 1);
    manager.shutdown();
}

#[tokio::test]
async fn test_connection_limit_closes_with_try_again_later() {
    let (manager, addr) = start(RoomManagerConfig::new().max_connections(1)).await;
    let _first = connect(addr).await;
    wait_for_connections(&manager, 1).await;

    let mut second = connect(addr).await;
    assert_eq!(next_close_code(&mut second).await, 1013);
    assert_eq!(manager.registry().len(), 1);
    assert_eq!(manager.stats().total_rejected, 1);

    manager.shutdown();
}

#[tokio::test]
async fn test_shutdown_closes_clients_with_going_away() {
    let (manager, addr) = start(RoomManagerConfig::default()).await;
    let mut client = connect(addr).await;
    wait_for_connections(&manager, 1).await;

    assert_eq!(manager.shutdown(), 1);
    assert_eq!(next_close_code(&mut client).await, 1001);
    wait_for_connections(&manager, 0).await;
}

#[tokio::test]
async fn test_plain_http_gets_upgrade_required() {
    let (manager, addr) = start(RoomManagerConfig::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut response = Vec::new();
    tokio::time::timeout(WAIT, stream.read_to_end(&mut response))
        .await
        .unwrap()
        .unwrap();
    let response = String::from_utf8_lossy(&response);
    assert!(response.starts_with("HTTP/1.1 426"), "got: {response}");

    manager.shutdown();
}
