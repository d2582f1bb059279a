//! Application builder and request dispatch.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::middleware::{Middleware, compose, run_terminal};
use crate::options::ServerOptions;
use crate::request::{Method, Request};
use crate::response::{Response, ResponseInit};
use crate::router::{Layer, Route, Router, trim_trailing_slash};
use crate::websocket::{WebSocketHandler, WebSocketSession, upgrade_data};

/// Transport side of a WebSocket upgrade.
///
/// The server calls `upgrade` once per accepted upgrade request. Returning
/// the session back declines the upgrade and the request continues as
/// plain HTTP.
pub trait Upgrade: Send {
    /// Takes over the connection for `session`.
    fn upgrade(
        &mut self,
        session: WebSocketSession,
        handler: Arc<dyn WebSocketHandler>,
    ) -> std::result::Result<(), WebSocketSession>;
}

/// An [`Upgrade`] that declines every upgrade.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUpgrade;

impl Upgrade for NoUpgrade {
    fn upgrade(
        &mut self,
        session: WebSocketSession,
        _handler: Arc<dyn WebSocketHandler>,
    ) -> std::result::Result<(), WebSocketSession> {
        Err(session)
    }
}

/// Outcome of [`Server::fetch`].
#[derive(Debug)]
pub enum Dispatched {
    /// Send this response.
    Response(Response),
    /// The transport took over the connection.
    Upgraded,
}

enum Upgrading {
    Accepted,
    Responded(Response),
    Declined,
}

/// Application builder.
///
/// Collects options, app-level middleware, routes and child routers, then
/// [`App::build`] mounts everything into an immutable [`Server`].
///
/// # Example
///
/// ```
/// use oxide_dispatch::{App, Request, ServerOptions, handler};
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let mut app = App::new(ServerOptions::new());
/// app.get("/", [handler(|ctx| Box::pin(async move { Ok(ctx.text("hello", None)) }))])
///     .unwrap();
/// let server = app.build().unwrap();
///
/// let res = server.handle(Request::get("/")).await.unwrap();
/// assert_eq!(res.body_string().as_deref(), Some("hello"));
/// # });
/// ```
#[derive(Default)]
pub struct App {
    options: ServerOptions,
    router: Router,
    children: Vec<Router>,
    middleware: Vec<Arc<dyn Middleware>>,
    settings: HashMap<String, Value>,
}

impl App {
    /// Creates an application.
    pub fn new(options: ServerOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Server options.
    pub const fn server_options(&self) -> &ServerOptions {
        &self.options
    }

    /// The app router. Router middleware added here is prepended to routes
    /// registered afterwards.
    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    /// Stores an application setting.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Returns `true` if the setting exists.
    pub fn has(&self, key: &str) -> bool {
        self.settings.contains_key(key)
    }

    /// Reads an application setting.
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    /// Adds app-level middleware. It runs for every request, before route
    /// lookup.
    pub fn use_middleware(&mut self, mw: Arc<dyn Middleware>) -> &mut Self {
        self.middleware.push(mw);
        self
    }

    /// Registers a GET route.
    pub fn get<I>(&mut self, path: &str, chain: I) -> Result<&mut Self>
    where
        I: IntoIterator,
        I::Item: Into<Layer>,
    {
        self.register(Method::Get, path, chain)
    }

    /// Registers a POST route.
    pub fn post<I>(&mut self, path: &str, chain: I) -> Result<&mut Self>
    where
        I: IntoIterator,
        I::Item: Into<Layer>,
    {
        self.register(Method::Post, path, chain)
    }

    /// Registers a PUT route.
    pub fn put<I>(&mut self, path: &str, chain: I) -> Result<&mut Self>
    where
        I: IntoIterator,
        I::Item: Into<Layer>,
    {
        self.register(Method::Put, path, chain)
    }

    /// Registers a PATCH route.
    pub fn patch<I>(&mut self, path: &str, chain: I) -> Result<&mut Self>
    where
        I: IntoIterator,
        I::Item: Into<Layer>,
    {
        self.register(Method::Patch, path, chain)
    }

    /// Registers a DELETE route.
    pub fn delete<I>(&mut self, path: &str, chain: I) -> Result<&mut Self>
    where
        I: IntoIterator,
        I::Item: Into<Layer>,
    {
        self.register(Method::Delete, path, chain)
    }

    /// Registers a TRACE route.
    pub fn trace<I>(&mut self, path: &str, chain: I) -> Result<&mut Self>
    where
        I: IntoIterator,
        I::Item: Into<Layer>,
    {
        self.register(Method::Trace, path, chain)
    }

    /// Registers an OPTIONS route.
    pub fn options<I>(&mut self, path: &str, chain: I) -> Result<&mut Self>
    where
        I: IntoIterator,
        I::Item: Into<Layer>,
    {
        self.register(Method::Options, path, chain)
    }

    /// Registers a CONNECT route.
    pub fn connect<I>(&mut self, path: &str, chain: I) -> Result<&mut Self>
    where
        I: IntoIterator,
        I::Item: Into<Layer>,
    {
        self.register(Method::Connect, path, chain)
    }

    /// Registers a WebSocket route.
    pub fn ws(&mut self, path: &str, handler: impl WebSocketHandler + 'static) -> Result<&mut Self> {
        self.router.ws(path, handler)?;
        Ok(self)
    }

    /// Registers a route on the app router.
    pub fn register<I>(&mut self, method: Method, path: &str, chain: I) -> Result<&mut Self>
    where
        I: IntoIterator,
        I::Item: Into<Layer>,
    {
        self.router.register(method, path, chain)?;
        Ok(self)
    }

    /// Queues child routers to be merged at build time, after the app's
    /// own routes. Calling it with no routers does nothing.
    pub fn all(&mut self, routers: impl IntoIterator<Item = Router>) -> &mut Self {
        self.children.extend(routers);
        self
    }

    /// Mounts every route and freezes the application.
    pub fn build(self) -> Result<Server> {
        let Self {
            options,
            mut router,
            children,
            middleware,
            settings,
        } = self;

        router.merge(children, &options)?;
        info!(
            routes = router.trie().len(),
            middleware = middleware.len(),
            "application built"
        );

        Ok(Server {
            options: Arc::new(options),
            router,
            middleware,
            settings,
        })
    }
}

/// A built application. Immutable; share it as `Arc<Server>`.
pub struct Server {
    options: Arc<ServerOptions>,
    router: Router,
    middleware: Vec<Arc<dyn Middleware>>,
    settings: HashMap<String, Value>,
}

impl Server {
    /// Server options.
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// The mounted router.
    pub const fn router(&self) -> &Router {
        &self.router
    }

    /// Reads an application setting.
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    /// Returns `true` if the setting exists.
    pub fn has(&self, key: &str) -> bool {
        self.settings.contains_key(key)
    }

    /// Dispatches a request, offering WebSocket upgrades to `upgrade`.
    ///
    /// Failures go through the configured error handler. An `Err` from
    /// this method means the error handler re-raised, or the failure was a
    /// configuration error.
    pub async fn fetch(&self, request: Request, upgrade: &mut dyn Upgrade) -> Result<Dispatched> {
        let ctx = Context::new(request, Arc::clone(&self.options));
        match self.dispatch(ctx, upgrade).await {
            Ok(dispatched) => Ok(dispatched),
            Err(err) => self.recover(err).await.map(Dispatched::Response),
        }
    }

    /// Dispatches a request as plain HTTP.
    pub async fn handle(&self, request: Request) -> Result<Response> {
        let mut ctx = Context::new(request, Arc::clone(&self.options));
        match self.respond(&mut ctx).await {
            Ok(response) => Ok(response),
            Err(err) => self.recover(err).await,
        }
    }

    async fn dispatch(&self, mut ctx: Context, upgrade: &mut dyn Upgrade) -> Result<Dispatched> {
        trace!(method = %ctx.method(), path = %ctx.request.path, "dispatching request");

        if ctx.request.is_websocket_upgrade() {
            // A declined upgrade restarts from the untouched request.
            let request = ctx.request.clone();
            match self.try_upgrade(ctx, upgrade).await? {
                Upgrading::Accepted => return Ok(Dispatched::Upgraded),
                Upgrading::Responded(response) => return Ok(Dispatched::Response(response)),
                Upgrading::Declined => ctx = Context::new(request, Arc::clone(&self.options)),
            }
        }

        self.respond(&mut ctx).await.map(Dispatched::Response)
    }

    async fn try_upgrade(&self, mut ctx: Context, upgrade: &mut dyn Upgrade) -> Result<Upgrading> {
        let (Route { chain, params }, path) = self.lookup(Method::Ws, &ctx.request.path);
        let Some((Layer::Socket(socket), rest)) = chain.and_then(<[Layer]>::split_last) else {
            return Ok(Upgrading::Declined);
        };
        ctx.request.params = params;

        let rest = middleware_of(rest);
        if let Some(response) = compose(&mut ctx, &rest).await? {
            return Ok(Upgrading::Responded(response));
        }

        socket.before(&mut ctx).await?;
        let data = upgrade_data(socket.upgrade(&ctx))?;
        let session = WebSocketSession { data, context: ctx };

        match upgrade.upgrade(session, Arc::clone(socket)) {
            Ok(()) => {
                debug!(%path, "websocket upgraded");
                Ok(Upgrading::Accepted)
            }
            Err(_) => {
                debug!(%path, "websocket upgrade declined");
                Ok(Upgrading::Declined)
            }
        }
    }

    async fn respond(&self, ctx: &mut Context) -> Result<Response> {
        if let Some(response) = compose(ctx, &self.middleware).await? {
            return Ok(response);
        }

        let method = ctx.method().lookup();
        let (Route { chain, params }, path) = self.lookup(method, &ctx.request.path);
        ctx.request.params = params;

        let Some((terminal, rest)) = chain.and_then(<[Layer]>::split_last) else {
            if method == Method::Options {
                return Ok(self.allow(ctx, &path));
            }
            return Ok(ctx.not_found());
        };

        let rest = middleware_of(rest);
        if let Some(response) = compose(ctx, &rest).await? {
            return Ok(response);
        }

        match terminal {
            Layer::Middleware(terminal) => run_terminal(ctx, terminal).await,
            Layer::Socket(_) => Ok(ctx.not_found()),
        }
    }

    /// Finds the route for `path` as received. With `ignore_trailing_slash`
    /// a path that finds no chain is retried without its trailing `/`,
    /// unless the raw path names a node of its own (so OPTIONS still
    /// reports that node). Returns the route and the path it was found at.
    fn lookup(&self, method: Method, path: &str) -> (Route<'_>, String) {
        let route = self.router.find(method, path);
        if route.chain.is_none() && self.options.ignore_trailing_slash {
            let trimmed = trim_trailing_slash(path);
            if trimmed != path {
                let retry = self.router.find(method, trimmed);
                if retry.chain.is_some() || self.router.trie().matches(path).is_none() {
                    return (retry, trimmed.to_string());
                }
            }
        }
        (route, path.to_string())
    }

    /// Answers an OPTIONS request that has no handler of its own.
    fn allow(&self, ctx: &mut Context, path: &str) -> Response {
        let Some(methods) = self.router.allowed_methods(path) else {
            return ctx.not_found();
        };
        let allow = methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(",");
        ctx.text(
            allow.clone(),
            ResponseInit::new()
                .status(200)
                .status_text("OK")
                .header("Allow", allow),
        )
    }

    async fn recover(&self, err: Error) -> Result<Response> {
        if err.is_fatal() {
            error!(error = %err, "configuration error while serving");
            return Err(err);
        }

        match &self.options.error {
            Some(handler) => {
                warn!(error = %err, "request failed");
                handler(err).await
            }
            None => {
                error!(error = %err, "unhandled request error");
                Err(err)
            }
        }
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("options", &self.options)
            .field("router", &self.router)
            .field("children", &self.children.len())
            .field("middleware", &self.middleware.len())
            .field("settings", &self.settings)
            .finish()
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("options", &self.options)
            .field("router", &self.router)
            .field("middleware", &self.middleware.len())
            .field("settings", &self.settings)
            .finish()
    }
}

/// Middleware of a chain prefix. Registration guarantees that only the last
/// layer can be a socket handler.
fn middleware_of(layers: &[Layer]) -> Vec<Arc<dyn Middleware>> {
    layers
        .iter()
        .filter_map(Layer::as_middleware)
        .cloned()
        .collect()
}
