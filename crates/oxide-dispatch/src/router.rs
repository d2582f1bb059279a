//! Route table and trie router.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, ValidationError};
use crate::middleware::Middleware;
use crate::options::{RouterOptions, ServerOptions};
use crate::request::{Method, PathParams};
use crate::trie::PathTrie;
use crate::websocket::WebSocketHandler;

/// One element of a route chain.
#[derive(Clone)]
pub enum Layer {
    /// Middleware or terminal handler.
    Middleware(Arc<dyn Middleware>),
    /// WebSocket handler; only valid as the last element of a `WS` chain.
    Socket(Arc<dyn WebSocketHandler>),
}

impl Layer {
    /// Returns the middleware, if this is a middleware layer.
    pub fn as_middleware(&self) -> Option<&Arc<dyn Middleware>> {
        match self {
            Self::Middleware(mw) => Some(mw),
            Self::Socket(_) => None,
        }
    }

    /// Returns the WebSocket handler, if this is a socket layer.
    pub fn as_socket(&self) -> Option<&Arc<dyn WebSocketHandler>> {
        match self {
            Self::Middleware(_) => None,
            Self::Socket(handler) => Some(handler),
        }
    }
}

impl From<Arc<dyn Middleware>> for Layer {
    fn from(mw: Arc<dyn Middleware>) -> Self {
        Self::Middleware(mw)
    }
}

impl From<Arc<dyn WebSocketHandler>> for Layer {
    fn from(handler: Arc<dyn WebSocketHandler>) -> Self {
        Self::Socket(handler)
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Middleware(_) => f.write_str("Middleware"),
            Self::Socket(_) => f.write_str("Socket"),
        }
    }
}

/// A registration waiting to be mounted.
#[derive(Debug, Clone)]
pub struct RouteRecord {
    /// Route method.
    pub method: Method,
    /// Path with the router prefix applied.
    pub path: String,
    /// Router middleware followed by the registered chain.
    pub chain: Vec<Layer>,
}

/// Lookup result of [`Router::find`].
#[derive(Debug)]
pub struct Route<'a> {
    /// The chain registered for the method, or `None`.
    pub chain: Option<&'a [Layer]>,
    /// Path parameters.
    pub params: PathParams,
}

impl Route<'_> {
    /// The not-found sentinel: no chain and no parameters.
    pub fn not_found() -> Self {
        Self {
            chain: None,
            params: PathParams::new(),
        }
    }
}

/// A set of routes.
///
/// Registrations (`get`, `post`, ..., `register`) are recorded in the
/// route table with the router prefix applied. They become matchable once
/// mounted into the trie, which happens when the owning `App` is built.
/// `mount` writes to the trie directly.
///
/// # Example
///
/// ```ignore
/// let mut users = Router::with_options(RouterOptions::new().prefix("/users"));
/// users
///     .get("/", [list_users])?
///     .get("/{id}", [load_user, show_user])?;
///
/// let mut app = App::new(ServerOptions::new().prefix("/api"));
/// app.all([users]);
/// let server = app.build()?;
/// ```
#[derive(Default)]
pub struct Router {
    options: RouterOptions,
    trie: PathTrie,
    middleware: Vec<Arc<dyn Middleware>>,
    route_table: Vec<RouteRecord>,
}

impl Router {
    /// Creates a router without a prefix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a router with options.
    pub fn with_options(options: RouterOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Router options.
    pub const fn router_options(&self) -> &RouterOptions {
        &self.options
    }

    /// Overlays options; fields set in `options` win.
    pub fn set_options(&mut self, options: RouterOptions) -> &mut Self {
        if options.prefix.is_some() {
            self.options.prefix = options.prefix;
        }
        if options.ignore_trailing_slash.is_some() {
            self.options.ignore_trailing_slash = options.ignore_trailing_slash;
        }
        self
    }

    /// Adds router middleware, prepended to every route registered after
    /// this call.
    pub fn middleware(&mut self, mw: Arc<dyn Middleware>) -> &mut Self {
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
        let handler: Arc<dyn WebSocketHandler> = Arc::new(handler);
        self.register(Method::Ws, path, [Layer::Socket(handler)])
    }

    /// Registers a route from a method name.
    pub fn route<I>(&mut self, method: &str, path: &str, chain: I) -> Result<&mut Self>
    where
        I: IntoIterator,
        I::Item: Into<Layer>,
    {
        let method = Method::parse(method)?;
        self.register(method, path, chain)
    }

    /// Validates a registration and appends it to the route table.
    pub fn register<I>(&mut self, method: Method, path: &str, chain: I) -> Result<&mut Self>
    where
        I: IntoIterator,
        I::Item: Into<Layer>,
    {
        if !path.starts_with('/') {
            return Err(ValidationError::InvalidPath(path.to_string()).into());
        }

        let chain: Vec<Layer> = chain.into_iter().map(Into::into).collect();
        if chain.is_empty() {
            return Err(ValidationError::EmptyChain(path.to_string()).into());
        }

        if !method.is_registrable() {
            return Err(ValidationError::UnsupportedMethod(method.to_string()).into());
        }

        check_socket_placement(method, path, &chain)?;

        let prefix = format_prefix(self.options.prefix.as_deref());
        if !prefix.is_empty() && !prefix.starts_with('/') {
            return Err(ValidationError::InvalidPrefix(prefix.to_string()).into());
        }

        let mut layers: Vec<Layer> = self.middleware.iter().cloned().map(Layer::Middleware).collect();
        layers.extend(chain);

        let path = format!("{prefix}{path}");
        debug!(%method, %path, layers = layers.len(), "registered route");
        self.route_table.push(RouteRecord {
            method,
            path,
            chain: layers,
        });
        Ok(self)
    }

    /// Registrations recorded so far, in order.
    pub fn route_table(&self) -> &[RouteRecord] {
        &self.route_table
    }

    /// Commits a chain into the trie. Mounting the same method and path
    /// twice appends to the existing chain.
    pub fn mount<I>(&mut self, method: Method, path: &str, chain: I) -> Result<&mut Self>
    where
        I: IntoIterator,
        I::Item: Into<Layer>,
    {
        let node = self.trie.define(path)?;
        node.append(method, chain.into_iter().map(Into::into));
        debug!(%method, %path, "mounted route");
        Ok(self)
    }

    /// Looks up the chain for `method` at `path`.
    pub fn find(&self, method: Method, path: &str) -> Route<'_> {
        match self.trie.matches(path) {
            Some(found) => Route {
                chain: found.node.chain(method),
                params: found.params,
            },
            None => Route::not_found(),
        }
    }

    /// HTTP methods served at the node matching `path`, sorted, with `HEAD`
    /// implied by `GET`. `None` when nothing matches or only `WS` is
    /// registered there.
    pub fn allowed_methods(&self, path: &str) -> Option<Vec<Method>> {
        let found = self.trie.matches(path)?;
        let mut methods: Vec<Method> = found
            .node
            .methods()
            .into_iter()
            .filter(|m| m.is_http())
            .collect();
        if methods.is_empty() {
            return None;
        }
        if methods.contains(&Method::Get) {
            methods.push(Method::Head);
        }
        methods.sort();
        methods.dedup();
        Some(methods)
    }

    /// The underlying trie.
    pub const fn trie(&self) -> &PathTrie {
        &self.trie
    }

    /// Mounts the route table of this router, then of each child, under
    /// the server prefix.
    pub(crate) fn merge(&mut self, children: Vec<Self>, server: &ServerOptions) -> Result<()> {
        let prefix = format_prefix(server.prefix.as_deref());
        if !prefix.is_empty() && !prefix.starts_with('/') {
            return Err(ValidationError::InvalidPrefix(prefix.to_string()).into());
        }

        let mut pending = Vec::new();
        let own = (self.options.clone(), self.route_table.clone());
        let children = children
            .into_iter()
            .map(|child| (child.options, child.route_table));

        for (options, records) in std::iter::once(own).chain(children) {
            let ignore = options
                .ignore_trailing_slash
                .unwrap_or(server.ignore_trailing_slash);
            for record in records {
                let path = format!("{prefix}{}", record.path);
                let path = if ignore {
                    trim_trailing_slash(&path).to_string()
                } else {
                    path
                };
                pending.push((record.method, path, record.chain));
            }
        }

        debug!(routes = pending.len(), "merging route tables");
        for (method, path, chain) in pending {
            self.mount(method, &path, chain)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("options", &self.options)
            .field("trie", &self.trie)
            .field("middleware", &self.middleware.len())
            .field("route_table", &self.route_table)
            .finish()
    }
}

/// Socket handlers may only terminate `WS` chains, and a `WS` chain must
/// end with one.
fn check_socket_placement(method: Method, path: &str, chain: &[Layer]) -> Result<()> {
    let sockets = chain.iter().filter(|l| l.as_socket().is_some()).count();
    let ends_with_socket = chain.last().is_some_and(|l| l.as_socket().is_some());
    let valid = match method {
        Method::Ws => sockets == 1 && ends_with_socket,
        _ => sockets == 0,
    };
    if valid {
        Ok(())
    } else {
        Err(ValidationError::MisplacedSocketHandler(path.to_string()).into())
    }
}

/// Strips one trailing `/` from a prefix; `None` is the empty prefix.
pub(crate) fn format_prefix(prefix: Option<&str>) -> &str {
    let prefix = prefix.unwrap_or_default();
    prefix.strip_suffix('/').unwrap_or(prefix)
}

/// Strips one trailing `/` from a path, leaving `/` itself alone.
pub(crate) fn trim_trailing_slash(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}
