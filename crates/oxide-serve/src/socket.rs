//! WebSocket upgrades over hyper.
//!
//! [`SocketUpgrade`] is the transport half of the dispatch upgrade
//! protocol. When the application accepts, the upgraded connection is
//! driven by a reader loop (peer to handler) and a writer task (queued
//! [`Frame`]s to peer). Every handler event runs as its own task.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{CONNECTION, HeaderValue, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, UPGRADE};
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper::{Request as HyperRequest, Response as HyperResponse, StatusCode};
use hyper_util::rt::TokioIo;
use oxide_dispatch::{
    Frame, Message, Result, Upgrade, WebSocket, WebSocketHandler, WebSocketSession,
};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::Role;
use tracing::{debug, trace, warn};

/// Close code reported when the connection ends without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code reported for a close frame without a status.
const NO_STATUS: u16 = 1005;

/// Upgrade handle for one hyper request.
#[derive(Debug, Default)]
pub struct SocketUpgrade {
    on_upgrade: Option<OnUpgrade>,
    key: Option<String>,
    accept: Option<String>,
}

impl SocketUpgrade {
    /// Claims the upgrade of `req` if it carries a `Sec-WebSocket-Key`.
    pub fn from_request<B>(req: &mut HyperRequest<B>) -> Self {
        let key = req
            .headers()
            .get(SEC_WEBSOCKET_KEY)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let on_upgrade = key.is_some().then(|| hyper::upgrade::on(&mut *req));

        Self {
            on_upgrade,
            key,
            accept: None,
        }
    }

    /// Returns `true` once an upgrade was accepted.
    pub const fn is_accepted(&self) -> bool {
        self.accept.is_some()
    }

    /// The `101 Switching Protocols` response completing the handshake.
    pub fn switching_protocols(&self) -> HyperResponse<Full<Bytes>> {
        let mut res = HyperResponse::new(Full::new(Bytes::new()));
        *res.status_mut() = StatusCode::SWITCHING_PROTOCOLS;

        let headers = res.headers_mut();
        headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        if let Some(accept) = self
            .accept
            .as_deref()
            .and_then(|accept| HeaderValue::from_str(accept).ok())
        {
            headers.insert(SEC_WEBSOCKET_ACCEPT, accept);
        }
        res
    }
}

impl Upgrade for SocketUpgrade {
    fn upgrade(
        &mut self,
        session: WebSocketSession,
        handler: Arc<dyn WebSocketHandler>,
    ) -> std::result::Result<(), WebSocketSession> {
        let (Some(on_upgrade), Some(key)) = (self.on_upgrade.take(), self.key.as_deref()) else {
            return Err(session);
        };
        self.accept = Some(derive_accept_key(key.as_bytes()));

        tokio::spawn(async move {
            match on_upgrade.await {
                Ok(upgraded) => run(upgraded, session, handler).await,
                Err(err) => warn!(error = %err, "websocket upgrade failed"),
            }
        });
        Ok(())
    }
}

async fn run(upgraded: Upgraded, session: WebSocketSession, handler: Arc<dyn WebSocketHandler>) {
    let path = session.context.request.path.clone();
    let stream =
        WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await;
    let (mut sink, mut source) = stream.split();
    let (ws, mut frames) = WebSocket::new(session);
    let ws = Arc::new(ws);
    debug!(%path, "websocket open");

    fire(&handler, &ws, "open", |h, ws| h.open(ws));

    let writer = {
        let handler = Arc::clone(&handler);
        let ws = Arc::clone(&ws);
        tokio::spawn(async move {
            while let Some(frame) = frames.next().await {
                let closing = matches!(frame, Frame::Close { .. });
                if let Err(err) = sink.send(into_message(frame)).await {
                    debug!(error = %err, "websocket write failed");
                    break;
                }
                fire(&handler, &ws, "drain", |h, ws| h.drain(ws));
                if closing {
                    break;
                }
            }
        })
    };

    let mut closed = (ABNORMAL_CLOSURE, String::new());
    while let Some(message) = source.next().await {
        match message {
            Ok(WsMessage::Text(text)) => {
                let message = Message::Text(text.as_str().to_owned());
                fire(&handler, &ws, "message", move |h, ws| h.message(ws, message));
            }
            Ok(WsMessage::Binary(bytes)) => {
                let message = Message::Binary(bytes.to_vec());
                fire(&handler, &ws, "message", move |h, ws| h.message(ws, message));
            }
            Ok(WsMessage::Ping(payload)) => {
                let payload = payload.to_vec();
                fire(&handler, &ws, "ping", move |h, ws| h.ping(ws, payload));
            }
            Ok(WsMessage::Pong(payload)) => {
                let payload = payload.to_vec();
                fire(&handler, &ws, "pong", move |h, ws| h.pong(ws, payload));
            }
            Ok(WsMessage::Close(frame)) => {
                closed = frame.map_or((NO_STATUS, String::new()), |frame| {
                    (u16::from(frame.code), frame.reason.as_str().to_owned())
                });
                break;
            }
            Ok(WsMessage::Frame(_)) => {}
            Err(err) => {
                debug!(error = %err, "websocket read failed");
                break;
            }
        }
    }

    writer.abort();
    let (code, reason) = closed;
    debug!(%path, code, "websocket closed");
    if let Err(err) = handler.close(&ws, code, reason).await {
        warn!(event = "close", error = %err, "websocket handler failed");
    }
}

/// Runs one handler event as an independent task.
fn fire<F>(handler: &Arc<dyn WebSocketHandler>, ws: &Arc<WebSocket>, event: &'static str, f: F)
where
    F: for<'a> FnOnce(&'a dyn WebSocketHandler, &'a WebSocket) -> BoxFuture<'a, Result<()>>
        + Send
        + 'static,
{
    let handler = Arc::clone(handler);
    let ws = Arc::clone(ws);
    tokio::spawn(async move {
        trace!(event, "websocket event");
        if let Err(err) = f(handler.as_ref(), &ws).await {
            warn!(event, error = %err, "websocket handler failed");
        }
    });
}

fn into_message(frame: Frame) -> WsMessage {
    match frame {
        Frame::Message(Message::Text(text)) => WsMessage::text(text),
        Frame::Message(Message::Binary(bytes)) => WsMessage::binary(bytes),
        Frame::Ping(payload) => WsMessage::Ping(payload.into()),
        Frame::Pong(payload) => WsMessage::Pong(payload.into()),
        Frame::Close { code, reason } => WsMessage::Close(Some(CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        })),
    }
}
