//! WebSocket handler contract.
//!
//! A `WS` route ends with a [`WebSocketHandler`]. On an upgrade request the
//! server runs [`WebSocketHandler::before`], collects per-connection data
//! from [`WebSocketHandler::upgrade`] and hands a [`WebSocketSession`] to
//! the transport. The transport then owns the connection and fires the
//! event methods, each as an independent task.

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::context::Context;
use crate::error::{ConfigError, HandlerError, Result};

/// A data message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// UTF-8 text.
    Text(String),
    /// Binary payload.
    Binary(Vec<u8>),
}

impl Message {
    /// Returns the text payload, if this is a text message.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Message {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

/// Outbound frame queued by a [`WebSocket`] for the transport to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Data message.
    Message(Message),
    /// Ping with payload.
    Ping(Vec<u8>),
    /// Pong with payload.
    Pong(Vec<u8>),
    /// Close handshake.
    Close {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// Everything the transport needs to accept an upgrade.
#[derive(Debug)]
pub struct WebSocketSession {
    /// Data returned by [`WebSocketHandler::upgrade`].
    pub data: Map<String, Value>,
    /// The context of the upgrade request.
    pub context: Context,
}

/// Handle to an accepted connection.
#[derive(Debug)]
pub struct WebSocket {
    data: Map<String, Value>,
    context: Context,
    sender: UnboundedSender<Frame>,
}

impl WebSocket {
    /// Creates a handle for a session, returning the queue of outbound
    /// frames the transport must drain.
    pub fn new(session: WebSocketSession) -> (Self, UnboundedReceiver<Frame>) {
        let (sender, receiver) = mpsc::unbounded();
        let ws = Self {
            data: session.data,
            context: session.context,
            sender,
        };
        (ws, receiver)
    }

    fn push(&self, frame: Frame) -> Result<()> {
        self.sender
            .unbounded_send(frame)
            .map_err(|_| HandlerError::SocketClosed.into())
    }

    /// Sends a data message.
    pub fn send(&self, message: impl Into<Message>) -> Result<()> {
        self.push(Frame::Message(message.into()))
    }

    /// Sends a ping.
    pub fn ping(&self, payload: impl Into<Vec<u8>>) -> Result<()> {
        self.push(Frame::Ping(payload.into()))
    }

    /// Sends a pong.
    pub fn pong(&self, payload: impl Into<Vec<u8>>) -> Result<()> {
        self.push(Frame::Pong(payload.into()))
    }

    /// Starts the close handshake. Later sends fail with
    /// [`HandlerError::SocketClosed`].
    pub fn close(&self, code: u16, reason: impl Into<String>) -> Result<()> {
        let result = self.push(Frame::Close {
            code,
            reason: reason.into(),
        });
        self.sender.close_channel();
        result
    }

    /// Returns `true` once the connection stopped accepting frames.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Per-connection data.
    pub const fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// The context of the upgrade request.
    pub const fn context(&self) -> &Context {
        &self.context
    }
}

/// Handler for a `WS` route. Every method is optional.
pub trait WebSocketHandler: Send + Sync {
    /// Runs before the upgrade, with access to the request context.
    fn before<'a>(&'a self, _ctx: &'a mut Context) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Produces the per-connection data. Must be a JSON object.
    fn upgrade(&self, _ctx: &Context) -> Value {
        Value::Object(Map::new())
    }

    /// The connection was accepted.
    fn open<'a>(&'a self, _ws: &'a WebSocket) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// A data message arrived.
    fn message<'a>(&'a self, _ws: &'a WebSocket, _message: Message) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// The connection closed.
    fn close<'a>(
        &'a self,
        _ws: &'a WebSocket,
        _code: u16,
        _reason: String,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Queued frames were flushed to the peer.
    fn drain<'a>(&'a self, _ws: &'a WebSocket) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// A ping arrived.
    fn ping<'a>(&'a self, _ws: &'a WebSocket, _payload: Vec<u8>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// A pong arrived.
    fn pong<'a>(&'a self, _ws: &'a WebSocket, _payload: Vec<u8>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Checks the value returned by [`WebSocketHandler::upgrade`].
pub(crate) fn upgrade_data(value: Value) -> std::result::Result<Map<String, Value>, ConfigError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Err(ConfigError::InvalidUpgradeData("null")),
        Value::Bool(_) => Err(ConfigError::InvalidUpgradeData("boolean")),
        Value::Number(_) => Err(ConfigError::InvalidUpgradeData("number")),
        Value::String(_) => Err(ConfigError::InvalidUpgradeData("string")),
        Value::Array(_) => Err(ConfigError::InvalidUpgradeData("array")),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::StreamExt;

    use super::*;
    use crate::error::Error;
    use crate::options::ServerOptions;
    use crate::request::Request;

    fn session() -> WebSocketSession {
        let mut data = Map::new();
        data.insert("user".into(), Value::from("ada"));
        WebSocketSession {
            data,
            context: Context::new(Request::get("/chat"), Arc::new(ServerOptions::default())),
        }
    }

    #[tokio::test]
    async fn test_frames_are_queued() {
        let (ws, mut frames) = WebSocket::new(session());
        ws.send("hello").unwrap();
        ws.ping(b"p".to_vec()).unwrap();
        ws.close(1000, "bye").unwrap();

        assert_eq!(frames.next().await, Some(Frame::Message(Message::from("hello"))));
        assert_eq!(frames.next().await, Some(Frame::Ping(b"p".to_vec())));
        assert_eq!(
            frames.next().await,
            Some(Frame::Close {
                code: 1000,
                reason: "bye".into()
            })
        );
        assert_eq!(frames.next().await, None);
    }

    #[test]
    fn test_send_after_close_fails() {
        let (ws, _frames) = WebSocket::new(session());
        ws.close(1000, "").unwrap();
        assert!(ws.is_closed());
        assert!(matches!(
            ws.send("late"),
            Err(Error::Handler(HandlerError::SocketClosed))
        ));
    }

    #[test]
    fn test_session_accessors() {
        let (ws, _frames) = WebSocket::new(session());
        assert_eq!(ws.data().get("user"), Some(&Value::from("ada")));
        assert_eq!(ws.context().request.path, "/chat");
    }

    #[test]
    fn test_upgrade_data_must_be_object() {
        assert!(upgrade_data(serde_json::json!({"a": 1})).is_ok());
        assert!(matches!(
            upgrade_data(serde_json::json!([1, 2])),
            Err(ConfigError::InvalidUpgradeData("array"))
        ));
    }
}
