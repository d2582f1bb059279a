//! # oxide-serve
//!
//! Runs an `oxide-dispatch` [`Server`](oxide_dispatch::Server) over hyper's
//! HTTP/1.1 connection handling, with WebSocket upgrades driven by
//! `tokio-tungstenite`.
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use oxide_dispatch::{App, ServerOptions, handler};
//!
//! let mut app = App::new(ServerOptions::new().port(8080));
//! app.get("/", [handler(|ctx| Box::pin(async move { Ok(ctx.text("hi", None)) }))])?;
//!
//! oxide_serve::serve(Arc::new(app.build()?), async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await?;
//! ```

pub mod convert;
pub mod server;
pub mod socket;

pub use convert::{Rejection, into_hyper, into_request};
pub use server::{handle_request, serve, serve_connection, serve_listener};
pub use socket::SocketUpgrade;
