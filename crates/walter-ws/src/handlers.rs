//! Room handler bindings.
//!
//! A room carries an optional-field [`RoomHandlers`] record. Each hook is an
//! async callback; its failure (an `Err` or a panic) is isolated at the call
//! site by [`invoke_isolated`] and never reaches the dispatcher.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use tracing::error;

use crate::connection::ConnectionRef;
use crate::error::{HandlerHook, WsError};

/// Result returned by room handlers.
pub type HandlerResult = anyhow::Result<()>;

/// Boxed future returned by room handlers.
pub type HandlerFuture = BoxFuture<'static, HandlerResult>;

/// Invoked with `(message, sender)` before a message is broadcast.
pub type MessageHandler = Arc<dyn Fn(Value, ConnectionRef) -> HandlerFuture + Send + Sync>;

/// Invoked with the joining connection.
pub type SubscribeHandler = Arc<dyn Fn(ConnectionRef) -> HandlerFuture + Send + Sync>;

/// Invoked with `(connection, is_disconnect)` when a connection leaves.
pub type UnsubscribeHandler = Arc<dyn Fn(ConnectionRef, bool) -> HandlerFuture + Send + Sync>;

/// Handler bindings attached to a room. Every hook is optional.
///
/// # Example
///
/// ```
/// use walter_ws::{Connection, Message, RoomHandlers};
///
/// let handlers = RoomHandlers::new()
///     .on_subscribe(|conn| async move {
///         conn.send(Message::text(r#"{"success":"welcome"}"#))?;
///         Ok(())
///     })
///     .on_unsubscribe(|_conn, is_disconnect| async move {
///         tracing::info!(is_disconnect, "member left");
///         Ok(())
///     });
///
/// assert!(handlers.has_on_subscribe());
/// assert!(!handlers.has_on_message());
/// ```
#[derive(Clone, Default)]
pub struct RoomHandlers {
    pub(crate) on_message: Option<MessageHandler>,
    pub(crate) on_subscribe: Option<SubscribeHandler>,
    pub(crate) on_unsubscribe: Option<UnsubscribeHandler>,
}

impl RoomHandlers {
    /// Create an empty set of bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the message hook.
    pub fn on_message<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Value, ConnectionRef) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.on_message = Some(Arc::new(move |message, sender| {
            Box::pin(handler(message, sender))
        }));
        self
    }

    /// Bind the subscribe hook. Replaces the default join acknowledgement.
    pub fn on_subscribe<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ConnectionRef) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.on_subscribe = Some(Arc::new(move |conn| Box::pin(handler(conn))));
        self
    }

    /// Bind the unsubscribe hook. Replaces the default leave notice.
    pub fn on_unsubscribe<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ConnectionRef, bool) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.on_unsubscribe = Some(Arc::new(move |conn, is_disconnect| {
            Box::pin(handler(conn, is_disconnect))
        }));
        self
    }

    /// Whether a message hook is bound.
    pub fn has_on_message(&self) -> bool {
        self.on_message.is_some()
    }

    /// Whether a subscribe hook is bound.
    pub fn has_on_subscribe(&self) -> bool {
        self.on_subscribe.is_some()
    }

    /// Whether an unsubscribe hook is bound.
    pub fn has_on_unsubscribe(&self) -> bool {
        self.on_unsubscribe.is_some()
    }
}

impl std::fmt::Debug for RoomHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomHandlers")
            .field("on_message", &self.has_on_message())
            .field("on_subscribe", &self.has_on_subscribe())
            .field("on_unsubscribe", &self.has_on_unsubscribe())
            .finish()
    }
}

/// Run a handler, converting an `Err` or a panic into a logged
/// [`WsError::Handler`].
///
/// `start` builds the handler future; it runs inside the panic guard too, so
/// a handler that panics before returning its future is caught as well.
pub(crate) async fn invoke_isolated<F>(room: &str, hook: HandlerHook, start: F) -> Result<(), WsError>
where
    F: FnOnce() -> HandlerFuture,
{
    let outcome = match std::panic::catch_unwind(AssertUnwindSafe(start)) {
        Ok(fut) => AssertUnwindSafe(fut).catch_unwind().await,
        Err(panic) => Err(panic),
    };

    let failure = match outcome {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(e)) => WsError::handler(room, hook, format!("{e:#}")),
        Err(panic) => WsError::handler(room, hook, panic_message(panic.as_ref())),
    };

    error!(room = %room, hook = %hook, error = %failure, "Room handler failed");
    walter_telemetry::metrics::record_handler_failure(hook.as_str());
    Err(failure)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invoke_isolated_ok() {
        let result = invoke_isolated("lobby", HandlerHook::Subscribe, || {
            Box::pin(async { Ok(()) })
        })
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_invoke_isolated_converts_error() {
        let err = invoke_isolated("lobby", HandlerHook::Message, || {
            Box::pin(async { Err(anyhow::anyhow!("database unavailable")) })
        })
        .await
        .unwrap_err();

        match err {
            WsError::Handler { room, hook, reason } => {
                assert_eq!(room, "lobby");
                assert_eq!(hook, HandlerHook::Message);
                assert!(reason.contains("database unavailable"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_invoke_isolated_catches_panic_in_future() {
        let err = invoke_isolated("lobby", HandlerHook::Unsubscribe, || {
            Box::pin(async { panic!("handler exploded") })
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("handler exploded"));
    }

    #[tokio::test]
    async fn test_invoke_isolated_catches_panic_before_future() {
        let err = invoke_isolated("lobby", HandlerHook::Subscribe, || -> HandlerFuture {
            panic!("no future for you")
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("no future for you"));
    }

    #[test]
    fn test_room_handlers_debug() {
        let handlers = RoomHandlers::new().on_message(|_msg, _sender| async { Ok(()) });
        let debug = format!("{handlers:?}");
        assert!(debug.contains("on_message: true"));
        assert!(debug.contains("on_subscribe: false"));
    }
}
