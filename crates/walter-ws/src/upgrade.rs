//! WebSocket HTTP upgrade handling.
//!
//! Validates RFC 6455 upgrade requests and builds the handshake response.
//! Requests that do not ask for an upgrade at all are answered with
//! `426 Upgrade Required`; malformed upgrade requests with `400 Bad Request`.

use base64::Engine;
use bytes::Bytes;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::Full;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, instrument};

use crate::error::{WsError, WsResult};

/// The WebSocket magic GUID used in the handshake.
const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Response body used by the transport.
pub type UpgradeBody = Full<Bytes>;

/// Check if a request is a complete WebSocket upgrade request.
///
/// A valid WebSocket upgrade request must have:
/// - `Connection: Upgrade` header
/// - `Upgrade: websocket` header
/// - `Sec-WebSocket-Key` header
/// - `Sec-WebSocket-Version: 13` header
pub fn is_websocket_request<B>(request: &Request<B>) -> bool {
    validate_upgrade_request(request).is_ok()
}

/// Check if the request asks for any protocol upgrade.
fn wants_upgrade<B>(request: &Request<B>) -> bool {
    request.headers().contains_key(header::UPGRADE) || has_upgrade_header(request)
}

fn has_upgrade_header<B>(request: &Request<B>) -> bool {
    request
        .headers()
        .get(header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        })
        .unwrap_or(false)
}

fn has_websocket_upgrade<B>(request: &Request<B>) -> bool {
    request
        .headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

fn has_websocket_version<B>(request: &Request<B>) -> bool {
    request
        .headers()
        .get(header::SEC_WEBSOCKET_VERSION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "13")
        .unwrap_or(false)
}

fn get_websocket_key<B>(request: &Request<B>) -> Option<&str> {
    request
        .headers()
        .get(header::SEC_WEBSOCKET_KEY)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Compute the Sec-WebSocket-Accept value from the key.
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    let result = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(result)
}

/// Validate a WebSocket upgrade request.
///
/// Returns the accept key if valid, or an error describing why it's invalid.
pub fn validate_upgrade_request<B>(request: &Request<B>) -> WsResult<String> {
    if request.method() != Method::GET {
        return Err(WsError::not_websocket("upgrade requests must use GET"));
    }

    if !has_upgrade_header(request) {
        return Err(WsError::not_websocket("missing Connection: Upgrade header"));
    }

    if !has_websocket_upgrade(request) {
        return Err(WsError::not_websocket("missing Upgrade: websocket header"));
    }

    let key = get_websocket_key(request)
        .ok_or_else(|| WsError::not_websocket("missing Sec-WebSocket-Key header"))?;

    if !has_websocket_version(request) {
        return Err(WsError::not_websocket(
            "missing or invalid Sec-WebSocket-Version header (must be 13)",
        ));
    }

    Ok(compute_accept_key(key))
}

fn switching_protocols(accept_key: &str) -> WsResult<Response<UpgradeBody>> {
    Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(header::CONNECTION, "Upgrade")
        .header(header::UPGRADE, "websocket")
        .header(header::SEC_WEBSOCKET_ACCEPT, accept_key)
        .body(Full::new(Bytes::new()))
        .map_err(|e| WsError::handshake_failed(e.to_string()))
}

fn plain_response(status: StatusCode, reason: &str) -> Response<UpgradeBody> {
    let mut response = Response::new(Full::new(Bytes::from(reason.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    if status == StatusCode::UPGRADE_REQUIRED {
        response
            .headers_mut()
            .insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        response
            .headers_mut()
            .insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    }
    response
}

/// Build the response to an HTTP request on the room endpoint.
///
/// Returns `101 Switching Protocols` for a valid upgrade; the caller must
/// then finish the upgrade with [`complete_upgrade`].
#[instrument(skip(request), fields(method = %request.method(), path = %request.uri().path()))]
pub fn upgrade_response<B>(request: &Request<B>) -> Response<UpgradeBody> {
    if !wants_upgrade(request) {
        debug!("Rejected plain HTTP request");
        return plain_response(
            StatusCode::UPGRADE_REQUIRED,
            "This endpoint only accepts WebSocket connections",
        );
    }

    match validate_upgrade_request(request).and_then(|key| switching_protocols(&key)) {
        Ok(response) => response,
        Err(e) => {
            debug!(error = %e, "WebSocket upgrade validation failed");
            plain_response(StatusCode::BAD_REQUEST, &e.to_string())
        }
    }
}

/// Complete a WebSocket upgrade.
///
/// This should be called once the `101` response has been sent. It wraps the
/// upgraded IO stream as a server-role WebSocket stream.
pub async fn complete_upgrade<S>(stream: S) -> WebSocketStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    WebSocketStream::from_raw_socket(stream, tungstenite::protocol::Role::Server, None).await
}
