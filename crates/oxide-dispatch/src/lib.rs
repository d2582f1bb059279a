//! # oxide-dispatch
//!
//! Request routing and middleware dispatch between an HTTP/WebSocket
//! listener and application handlers.
//!
//! This crate provides:
//! - A path trie with named and catch-all parameters
//! - Routers with prefixes, router middleware and a route table merged at
//!   build time
//! - Continuation-style middleware with short-circuit responses
//! - A per-request [`Context`] that layers headers, resets its state after
//!   each response and adds weak ETags
//! - Implicit `HEAD` and `OPTIONS` handling
//! - A WebSocket handler contract for transports
//!
//! The crate does not bind sockets. `oxide-serve` runs a [`Server`] over
//! hyper.
//!
//! ## Quick Start
//!
//! ```ignore
//! use oxide_dispatch::{App, Request, ServerOptions, handler};
//!
//! let hello = handler(|ctx| Box::pin(async move { Ok(ctx.text("Hello, World!", None)) }));
//! let user = handler(|ctx| Box::pin(async move {
//!     let id = ctx.params().get("id").unwrap_or("unknown").to_string();
//!     ctx.json(&serde_json::json!({ "id": id }), None)
//! }));
//!
//! let mut app = App::new(ServerOptions::new().etag(true));
//! app.get("/", [hello])?.get("/users/{id}", [user])?;
//! let server = app.build()?;
//!
//! let response = server.handle(Request::get("/users/123")).await?;
//! ```
//!
//! ## Middleware
//!
//! Middleware receives the context and a [`Next`] token. It either
//! continues, responds, or fails:
//!
//! ```ignore
//! use oxide_dispatch::{Logger, ResponseInit, middleware};
//!
//! let auth = middleware(|ctx, next| Box::pin(async move {
//!     if ctx.request.get_header("Authorization").is_none() {
//!         return Ok(ctx.text("Unauthorized", ResponseInit::new().status(401)).into());
//!     }
//!     Ok(next.proceed())
//! }));
//!
//! app.use_middleware(Arc::new(Logger));
//! app.get("/admin", [auth, admin_page])?;
//! ```
//!
//! The last element of a route chain is its terminal handler; everything
//! before it runs as middleware.
//!
//! ## Routers
//!
//! ```ignore
//! use oxide_dispatch::{Router, RouterOptions};
//!
//! let mut api = Router::with_options(RouterOptions::new().prefix("/api/v1"));
//! api.get("/users", [list_users])?.post("/users", [create_user])?;
//!
//! app.all([api]);
//! ```

mod app;
mod context;
mod error;
pub mod etag;
mod headers;
mod middleware;
mod options;
mod request;
mod response;
mod router;
mod trie;
mod websocket;

pub use app::{App, Dispatched, NoUpgrade, Server, Upgrade};
pub use context::{Context, HeaderAccess, NON_ERROR_RANGE, POWERED_BY};
pub use error::{ConfigError, DispatchError, Error, HandlerError, Result, ValidationError};
pub use headers::Headers;
pub use middleware::{
    Continuation, Flow, HandlerFn, Logger, Middleware, MiddlewareFn, Next, compose, handler,
    middleware, run_terminal,
};
pub use options::{Environment, ErrorHandler, RouterOptions, ServerOptions};
pub use request::{Method, PathParams, Request};
pub use response::{Body, Response, ResponseInit, reason_phrase};
pub use router::{Layer, Route, RouteRecord, Router};
pub use trie::{PathTrie, TrieMatch, TrieNode};
pub use websocket::{Frame, Message, WebSocket, WebSocketHandler, WebSocketSession};

/// Boxed future returned by middleware and handlers.
pub use futures::future::BoxFuture;
