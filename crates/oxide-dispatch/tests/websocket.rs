//! Tests for the WebSocket upgrade path.

mod common;

use std::sync::Arc;

use common::*;
use futures::StreamExt;
use futures::future::BoxFuture;
use oxide_dispatch::{
    ConfigError, Context, Dispatched, Error, Frame, Layer, Message, NoUpgrade, Request, Response,
    ResponseInit, Result, ServerOptions, Upgrade, WebSocket, WebSocketHandler, WebSocketSession,
    handler, middleware,
};
use serde_json::{Value, json};

struct Chat;

impl WebSocketHandler for Chat {
    fn before<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let user = ctx.request.get_query("user").unwrap_or("anonymous").to_string();
            ctx.locals.insert("user".into(), user.into());
            Ok(())
        })
    }

    fn upgrade(&self, ctx: &Context) -> Value {
        json!({ "user": ctx.locals["user"], "room": ctx.params().get("room") })
    }

    fn open<'a>(&'a self, ws: &'a WebSocket) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let user = ws.data()["user"].as_str().unwrap_or_default();
            ws.send(format!("welcome {user}"))
        })
    }

    fn message<'a>(&'a self, ws: &'a WebSocket, message: Message) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { ws.send(message) })
    }
}

struct BadUpgrade;

impl WebSocketHandler for BadUpgrade {
    fn upgrade(&self, _ctx: &Context) -> Value {
        json!(["not", "an", "object"])
    }
}

/// Leaves response state behind before the transport answers.
struct Marking;

impl WebSocketHandler for Marking {
    fn before<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            ctx.set_header("X-Ws-Only", "1")?;
            ctx.status(101);
            ctx.locals.insert("socket".into(), json!(true));
            Ok(())
        })
    }
}

/// Transport double that records sessions.
#[derive(Default)]
struct Capture {
    accept: bool,
    sessions: Vec<(WebSocketSession, Arc<dyn WebSocketHandler>)>,
}

impl Upgrade for Capture {
    fn upgrade(
        &mut self,
        session: WebSocketSession,
        handler: Arc<dyn WebSocketHandler>,
    ) -> std::result::Result<(), WebSocketSession> {
        if self.accept {
            self.sessions.push((session, handler));
            Ok(())
        } else {
            Err(session)
        }
    }
}

fn upgrade_request(target: &str) -> Request {
    Request::from_target(oxide_dispatch::Method::Get, target)
        .header("Upgrade", "websocket")
        .header("Connection", "Upgrade")
        .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
}

#[tokio::test]
async fn test_accepted_upgrade_hands_over_session() {
    let server = build(ServerOptions::new(), |app| {
        app.ws("/rooms/{room}", Chat).unwrap();
    });
    let mut transport = Capture {
        accept: true,
        ..Capture::default()
    };

    let outcome = server
        .fetch(upgrade_request("/rooms/rust?user=ada"), &mut transport)
        .await
        .unwrap();
    assert!(matches!(outcome, Dispatched::Upgraded));

    let (session, handler) = transport.sessions.pop().unwrap();
    assert_eq!(session.data["user"], json!("ada"));
    assert_eq!(session.data["room"], json!("rust"));
    assert_eq!(session.context.request.path, "/rooms/rust");

    let (ws, mut frames) = WebSocket::new(session);
    handler.open(&ws).await.unwrap();
    handler.message(&ws, Message::from("ping")).await.unwrap();

    assert_eq!(
        frames.next().await,
        Some(Frame::Message(Message::from("welcome ada")))
    );
    assert_eq!(frames.next().await, Some(Frame::Message(Message::from("ping"))));
}

#[tokio::test]
async fn test_declined_upgrade_continues_as_http() {
    let server = build(ServerOptions::new(), |app| {
        app.ws("/chat", Chat).unwrap();
        app.get("/chat", [text("fallback")]).unwrap();
    });
    let mut transport = Capture::default();

    let outcome = server
        .fetch(upgrade_request("/chat"), &mut transport)
        .await
        .unwrap();
    let Dispatched::Response(res) = outcome else {
        panic!("expected an HTTP response");
    };
    assert_eq!(body(&res), "fallback");
}

#[tokio::test]
async fn test_declined_upgrade_starts_from_a_fresh_context() {
    let server = build(ServerOptions::new(), |app| {
        app.ws("/chat", Marking).unwrap();
        app.get(
            "/chat",
            [handler(|ctx| {
                Box::pin(async move {
                    let locals = ctx.locals.len().to_string();
                    Ok(ctx.text(locals, None))
                })
            })],
        )
        .unwrap();
    });

    let outcome = server
        .fetch(upgrade_request("/chat"), &mut NoUpgrade)
        .await
        .unwrap();
    let Dispatched::Response(res) = outcome else {
        panic!("expected an HTTP response");
    };
    assert_eq!(res.status, 200);
    assert_eq!(body(&res), "0");
    assert_eq!(res.headers.get("X-Ws-Only"), None);
}

#[tokio::test]
async fn test_plain_request_to_socket_route_is_not_found() {
    let server = build(ServerOptions::new(), |app| {
        app.ws("/chat", Chat).unwrap();
    });

    let res = send(&server, Request::get("/chat")).await;
    assert_eq!(res.status, 404);

    let options = send(&server, Request::new(oxide_dispatch::Method::Options, "/chat")).await;
    assert_eq!(options.status, 404);
}

#[tokio::test]
async fn test_socket_route_middleware_can_refuse() {
    let guard = middleware(|ctx, next| {
        Box::pin(async move {
            if ctx.request.get_query("token").is_some() {
                return Ok(next.proceed());
            }
            Ok(ctx.text("Unauthorized", ResponseInit::new().status(401)).into())
        })
    });
    let server = build(ServerOptions::new(), |app| {
        app.register(
            oxide_dispatch::Method::Ws,
            "/secure",
            [Layer::from(guard), Layer::Socket(Arc::new(Chat))],
        )
        .unwrap();
    });
    let mut transport = Capture {
        accept: true,
        ..Capture::default()
    };

    let refused = server
        .fetch(upgrade_request("/secure"), &mut transport)
        .await
        .unwrap();
    let Dispatched::Response(res) = refused else {
        panic!("expected a refusal");
    };
    assert_eq!(res.status, 401);
    assert!(transport.sessions.is_empty());

    let allowed = server
        .fetch(upgrade_request("/secure?token=t"), &mut transport)
        .await
        .unwrap();
    assert!(matches!(allowed, Dispatched::Upgraded));
    assert_eq!(transport.sessions.len(), 1);
}

#[tokio::test]
async fn test_invalid_upgrade_data_bypasses_error_handler() {
    let options = ServerOptions::new().on_error(|_err| async move { Ok(Response::new(500)) });
    let server = build(options, |app| {
        app.ws("/bad", BadUpgrade).unwrap();
    });
    let mut transport = Capture {
        accept: true,
        ..Capture::default()
    };

    let err = server
        .fetch(upgrade_request("/bad"), &mut transport)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Config(ConfigError::InvalidUpgradeData("array"))
    ));
    assert!(transport.sessions.is_empty());
}

#[tokio::test]
async fn test_upgrade_on_http_route_is_plain_http() {
    let server = build(ServerOptions::new(), |app| {
        app.get("/", [handler(|ctx| Box::pin(async move { Ok(ctx.text("home", None)) }))])
            .unwrap();
    });
    let mut transport = Capture {
        accept: true,
        ..Capture::default()
    };

    let outcome = server.fetch(upgrade_request("/"), &mut transport).await.unwrap();
    assert!(matches!(outcome, Dispatched::Response(ref res) if res.status == 200));
    assert!(transport.sessions.is_empty());
}
