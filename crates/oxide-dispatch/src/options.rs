//! Server and router configuration.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::response::Response;

/// Application error handler.
///
/// Receives every per-request failure. Returning `Ok` maps the failure to a
/// response, returning `Err` re-raises it to the transport.
pub type ErrorHandler = Arc<dyn Fn(Error) -> BoxFuture<'static, Result<Response>> + Send + Sync>;

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Error messages are exposed in responses by the transport.
    Development,
    /// Default.
    #[default]
    Production,
}

/// Server-wide options.
///
/// Can be deserialized from JSON (`camelCase` keys, `eTag` accepted as an
/// alias of `etag`) or built with the chainable setters.
#[derive(Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerOptions {
    /// Deployment environment.
    pub env: Environment,
    /// TCP port to bind.
    pub port: u16,
    /// Host name or address to bind.
    pub hostname: String,
    /// Unix socket path; takes precedence over `hostname`/`port`.
    pub unix: Option<PathBuf>,
    /// Prefix applied to every mounted route.
    pub prefix: Option<String>,
    /// Trim one trailing `/` from paths before mounting and lookup.
    pub ignore_trailing_slash: bool,
    /// Add an `ETag` header to non-error responses.
    #[serde(alias = "eTag")]
    pub etag: bool,
    /// Upper bound for request bodies, in bytes.
    pub max_request_body_size: usize,
    /// Custom error handler.
    #[serde(skip)]
    pub error: Option<ErrorHandler>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            env: Environment::default(),
            port: 3000,
            hostname: "0.0.0.0".to_string(),
            unix: None,
            prefix: None,
            ignore_trailing_slash: false,
            etag: false,
            max_request_body_size: 128 * 1024 * 1024,
            error: None,
        }
    }
}

impl fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerOptions")
            .field("env", &self.env)
            .field("port", &self.port)
            .field("hostname", &self.hostname)
            .field("unix", &self.unix)
            .field("prefix", &self.prefix)
            .field("ignore_trailing_slash", &self.ignore_trailing_slash)
            .field("etag", &self.etag)
            .field("max_request_body_size", &self.max_request_body_size)
            .field("error", &self.error.as_ref().map(|_| "<handler>"))
            .finish()
    }
}

impl ServerOptions {
    /// Creates the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the environment.
    #[must_use]
    pub const fn env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the host name.
    #[must_use]
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Sets the Unix socket path.
    #[must_use]
    pub fn unix(mut self, path: impl Into<PathBuf>) -> Self {
        self.unix = Some(path.into());
        self
    }

    /// Sets the route prefix.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Enables or disables trailing slash normalization.
    #[must_use]
    pub const fn ignore_trailing_slash(mut self, enabled: bool) -> Self {
        self.ignore_trailing_slash = enabled;
        self
    }

    /// Enables or disables ETag generation.
    #[must_use]
    pub const fn etag(mut self, enabled: bool) -> Self {
        self.etag = enabled;
        self
    }

    /// Sets the request body limit.
    #[must_use]
    pub const fn max_request_body_size(mut self, bytes: usize) -> Self {
        self.max_request_body_size = bytes;
        self
    }

    /// Installs an error handler.
    #[must_use]
    pub fn on_error<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Error) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        self.error = Some(Arc::new(move |err| Box::pin(handler(err))));
        self
    }

    /// Returns `true` in the development environment.
    pub fn is_development(&self) -> bool {
        self.env == Environment::Development
    }
}

/// Per-router options. Unset fields fall back to the server options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RouterOptions {
    /// Prefix applied to paths at registration.
    pub prefix: Option<String>,
    /// Overrides `ServerOptions::ignore_trailing_slash` for this router.
    pub ignore_trailing_slash: Option<bool>,
}

impl RouterOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the prefix.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Sets the trailing slash override.
    #[must_use]
    pub const fn ignore_trailing_slash(mut self, enabled: bool) -> Self {
        self.ignore_trailing_slash = Some(enabled);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let opts = ServerOptions::from_json(
            r#"{"env":"development","port":8080,"prefix":"/api","eTag":true,"ignoreTrailingSlash":true}"#,
        )
        .unwrap();
        assert!(opts.is_development());
        assert_eq!(opts.port, 8080);
        assert_eq!(opts.prefix.as_deref(), Some("/api"));
        assert!(opts.etag);
        assert!(opts.ignore_trailing_slash);
        assert_eq!(opts.hostname, "0.0.0.0");
        assert!(opts.error.is_none());
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(ServerOptions::from_json(r#"{"port":"eighty"}"#).is_err());
    }

    #[test]
    fn test_builder() {
        let opts = ServerOptions::new()
            .port(4000)
            .etag(true)
            .on_error(|err| async move { Ok(Response::text(err.to_string()).status(500)) });
        assert_eq!(opts.port, 4000);
        assert!(opts.etag);
        assert!(opts.error.is_some());
        assert!(format!("{opts:?}").contains("<handler>"));
    }
}
