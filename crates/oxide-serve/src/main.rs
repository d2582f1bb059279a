//! oxide-serve CLI
//!
//! Serves a small demo application: plain routes, path parameters and a
//! WebSocket echo endpoint.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use oxide_dispatch::{
    App, BoxFuture, Environment, Logger, Message, Result, ServerOptions, WebSocket,
    WebSocketHandler, handler,
};
use serde_json::json;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

/// HTTP and WebSocket demo server.
#[derive(Parser)]
#[command(name = "oxide-serve")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Host name or address to bind.
    #[arg(long, env = "OXIDE_HOST", default_value = "0.0.0.0")]
    hostname: String,

    /// Port to bind.
    #[arg(short, long, env = "OXIDE_PORT", default_value_t = 3000)]
    port: u16,

    /// Unix socket path (overrides hostname and port).
    #[arg(long, env = "OXIDE_UNIX")]
    unix: Option<PathBuf>,

    /// Prefix for every route.
    #[arg(long, env = "OXIDE_PREFIX")]
    prefix: Option<String>,

    /// Treat `/path/` and `/path` as the same route.
    #[arg(long)]
    ignore_trailing_slash: bool,

    /// Add weak ETags to successful responses.
    #[arg(long)]
    etag: bool,

    /// Expose error messages in 500 responses.
    #[arg(long, env = "OXIDE_DEV")]
    dev: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn options(&self) -> ServerOptions {
        let mut options = ServerOptions::new()
            .hostname(self.hostname.clone())
            .port(self.port)
            .ignore_trailing_slash(self.ignore_trailing_slash)
            .etag(self.etag);
        if self.dev {
            options = options.env(Environment::Development);
        }
        if let Some(unix) = &self.unix {
            options = options.unix(unix.clone());
        }
        if let Some(prefix) = &self.prefix {
            options = options.prefix(prefix.clone());
        }
        options
    }
}

struct Echo;

impl WebSocketHandler for Echo {
    fn open<'a>(&'a self, ws: &'a WebSocket) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { ws.send("connected") })
    }

    fn message<'a>(&'a self, ws: &'a WebSocket, message: Message) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { ws.send(message) })
    }
}

fn demo(options: ServerOptions) -> Result<App> {
    let mut app = App::new(options);
    app.use_middleware(Arc::new(Logger));

    app.get(
        "/",
        [handler(|ctx| {
            Box::pin(async move { Ok(ctx.text("Hello from oxide-serve", None)) })
        })],
    )?
    .get(
        "/ping",
        [handler(|ctx| Box::pin(async move { Ok(ctx.text("pong", None)) }))],
    )?
    .get(
        "/users/{id}",
        [handler(|ctx| {
            Box::pin(async move {
                let id = ctx.params().get("id").unwrap_or_default().to_string();
                ctx.json(&json!({ "id": id }), None)
            })
        })],
    )?
    .ws("/echo", Echo)?;

    Ok(app)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let server = Arc::new(demo(cli.options())?.build()?);

    oxide_serve::serve(server, async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl-C");
        }
    })
    .await?;

    Ok(())
}
