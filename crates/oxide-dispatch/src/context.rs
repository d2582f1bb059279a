//! Per-request context and response finalization.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::error::{HandlerError, Result};
use crate::etag;
use crate::headers::Headers;
use crate::options::ServerOptions;
use crate::request::{Method, PathParams, Request};
use crate::response::{Body, Response, ResponseInit, reason_phrase};

/// Value of the `X-Powered-By` header added to every finalized response.
pub const POWERED_BY: &str = "oxide-dispatch";

/// Highest status code that still receives an `ETag`.
pub const NON_ERROR_RANGE: u16 = 399;

/// State for one request/response cycle.
///
/// Handlers accumulate response directives with the chainable setters and
/// produce the outbound [`Response`] with one of the terminal producers
/// (`json`, `text`, `send`, `raw`, `head`, `render`, `response`).
///
/// A context is owned by the request that created it and is never shared
/// across requests.
pub struct Context {
    /// The normalized request.
    pub request: Request,
    /// Free-form data passed between handlers of the same request.
    pub locals: HashMap<String, Value>,
    method: Method,
    options: Arc<ServerOptions>,
    pending: ResponseInit,
    fresh: bool,
}

impl Context {
    /// Creates a context for a request.
    pub fn new(request: Request, options: Arc<ServerOptions>) -> Self {
        Self {
            method: request.method,
            request,
            locals: HashMap::new(),
            options,
            pending: ResponseInit::new(),
            fresh: true,
        }
    }

    /// The method the request was received with. `HEAD` stays `HEAD` even
    /// though it is routed to `GET` handlers.
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Path parameters of the matched route.
    pub const fn params(&self) -> &PathParams {
        &self.request.params
    }

    /// Server options.
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Returns `false` once a response directive has been set since the
    /// last finalize.
    pub const fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// Pending response directives.
    pub const fn pending(&self) -> &ResponseInit {
        &self.pending
    }

    /// Pending response headers.
    pub const fn headers(&self) -> &Headers {
        &self.pending.headers
    }

    /// Sets the response status.
    pub fn status(&mut self, code: u16) -> &mut Self {
        self.fresh = false;
        self.pending.status = Some(code);
        self
    }

    /// Sets the response reason phrase.
    pub fn status_text(&mut self, text: impl Into<String>) -> &mut Self {
        self.fresh = false;
        self.pending.status_text = Some(text.into());
        self
    }

    /// Overlays partial response directives.
    pub fn option(&mut self, init: ResponseInit) -> &mut Self {
        self.fresh = false;
        self.pending.merge(init);
        self
    }

    /// Sets a response header.
    pub fn set_header(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<&mut Self> {
        self.fresh = false;
        let (key, value) = (key.into(), value.into());
        if key.is_empty() || value.is_empty() {
            return Err(HandlerError::InvalidHeader.into());
        }
        self.pending.headers.set(key, value);
        Ok(self)
    }

    /// Header accessor: `ctx.header().get(..)`, `.set(..)`, `.append(..)`.
    pub fn header(&mut self) -> HeaderAccess<'_> {
        HeaderAccess { ctx: self }
    }

    /// Finalizes a JSON response. A value that serializes to a string is
    /// sent as that text, unquoted.
    pub fn json<T: Serialize + ?Sized>(
        &mut self,
        body: &T,
        init: impl Into<Option<ResponseInit>>,
    ) -> Result<Response> {
        let body = match serde_json::to_value(body)? {
            Value::String(text) => Body::Text(text),
            value => Body::Bytes(serde_json::to_vec(&value)?),
        };
        Ok(self.finalize(
            body,
            ResponseInit::new().header("Content-Type", "application/json"),
            init.into(),
        ))
    }

    /// Finalizes a plain text response.
    pub fn text(
        &mut self,
        body: impl Into<String>,
        init: impl Into<Option<ResponseInit>>,
    ) -> Response {
        self.finalize(
            Body::Text(body.into()),
            ResponseInit::new().header("Content-Type", "text/plain"),
            init.into(),
        )
    }

    /// Finalizes an HTML response.
    pub fn send(
        &mut self,
        body: impl Into<Body>,
        init: impl Into<Option<ResponseInit>>,
    ) -> Response {
        self.finalize(
            body.into(),
            ResponseInit::new().header("Content-Type", "text/html"),
            init.into(),
        )
    }

    /// Finalizes a response without a default content type.
    pub fn raw(
        &mut self,
        body: impl Into<Body>,
        init: impl Into<Option<ResponseInit>>,
    ) -> Response {
        self.finalize(body.into(), ResponseInit::new(), init.into())
    }

    /// Finalizes an empty response.
    pub fn head(&mut self, init: impl Into<Option<ResponseInit>>) -> Response {
        self.finalize(
            Body::Empty,
            ResponseInit::new().header("Content-Type", "application/json"),
            init.into(),
        )
    }

    /// Finalizes a rendered view. Structured values are serialized to JSON.
    pub fn render(
        &mut self,
        view: impl Into<Body>,
        init: impl Into<Option<ResponseInit>>,
    ) -> Response {
        self.finalize(
            view.into(),
            ResponseInit::new()
                .status(200)
                .header("Content-Type", "text/html"),
            init.into(),
        )
    }

    /// Finalizes a response with no producer defaults.
    pub fn response(
        &mut self,
        body: impl Into<Body>,
        init: impl Into<Option<ResponseInit>>,
    ) -> Response {
        self.finalize(body.into(), ResponseInit::new(), init.into())
    }

    /// Finalizes the `Cannot <METHOD> <path>` 404 response.
    pub fn not_found(&mut self) -> Response {
        let body = format!("Cannot {} {}", self.method, self.request.path);
        self.finalize(
            Body::Text(body),
            ResponseInit::new()
                .status(404)
                .status_text("Not Found")
                .header("Content-Type", "text/plain"),
            None,
        )
    }

    /// Builds the outbound response.
    ///
    /// Header precedence, lowest first: computed defaults, producer
    /// defaults, per-call headers, context headers. The context status and
    /// reason phrase likewise win over the per-call ones.
    fn finalize(
        &mut self,
        body: Body,
        defaults: ResponseInit,
        init: Option<ResponseInit>,
    ) -> Response {
        let mut body = body.into_bytes();

        let mut call = defaults;
        if let Some(init) = init {
            call.merge(init);
        }

        let mut headers = Headers::new();
        headers.set("Content-Length", body.len().to_string());
        headers.set("X-Powered-By", POWERED_BY);
        headers.merge(&call.headers);
        headers.merge(&self.pending.headers);

        let status = self.pending.status.or(call.status).unwrap_or(200);
        let status_text = self
            .pending
            .status_text
            .clone()
            .or(call.status_text)
            .unwrap_or_else(|| reason_phrase(status).to_string());

        if self.options.etag && status <= NON_ERROR_RANGE {
            headers.set("ETag", etag::generate(&body));
        }

        if !self.fresh {
            self.pending = ResponseInit::new();
            self.fresh = true;
        }

        if self.method == Method::Head {
            body.clear();
        }

        Response {
            status,
            status_text,
            headers,
            body,
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.method)
            .field("path", &self.request.path)
            .field("pending", &self.pending)
            .field("fresh", &self.fresh)
            .finish_non_exhaustive()
    }
}

/// Accessor returned by [`Context::header`].
pub struct HeaderAccess<'a> {
    ctx: &'a mut Context,
}

impl<'a> HeaderAccess<'a> {
    /// Gets a pending response header.
    pub fn get(self, key: &str) -> Option<&'a str> {
        let ctx = self.ctx;
        ctx.pending.headers.get(key)
    }

    /// Sets a pending response header.
    pub fn set(self, key: impl Into<String>, value: impl Into<String>) -> Result<&'a mut Context> {
        let ctx = self.ctx;
        ctx.set_header(key, value)
    }

    /// Appends to a pending response header, setting it when absent.
    pub fn append(
        self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<&'a mut Context> {
        let ctx = self.ctx;
        ctx.fresh = false;
        let (key, value) = (key.into(), value.into());
        if key.is_empty() || value.is_empty() {
            return Err(HandlerError::InvalidHeader.into());
        }
        ctx.pending.headers.append(key, value);
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn context(method: Method, etag: bool) -> Context {
        let options = ServerOptions::new().etag(etag);
        Context::new(Request::new(method, "/ping"), Arc::new(options))
    }

    #[test]
    fn test_json_string_is_sent_verbatim() {
        let mut ctx = context(Method::Get, false);
        let res = ctx.json("hello", None).unwrap();
        assert_eq!(res.body, b"hello");
        assert_eq!(res.headers.get("Content-Length"), Some("5"));
        assert_eq!(res.headers.get("Content-Type"), Some("application/json"));

        let mut ctx = context(Method::Get, false);
        let res = ctx.json(&vec!["hello"], None).unwrap();
        assert_eq!(res.body, br#"["hello"]"#);
    }

    #[test]
    fn test_json_defaults() {
        let mut ctx = context(Method::Get, false);
        let res = ctx.json(&serde_json::json!({"ok": true}), None).unwrap();
        assert_eq!(res.status, 200);
        assert_eq!(res.status_text, "OK");
        assert_eq!(res.headers.get("Content-Type"), Some("application/json"));
        assert_eq!(res.headers.get("Content-Length"), Some("11"));
        assert_eq!(res.headers.get("X-Powered-By"), Some(POWERED_BY));
        assert_eq!(res.body, br#"{"ok":true}"#);
        assert!(res.headers.get("ETag").is_none());
    }

    #[test]
    fn test_header_precedence() {
        let mut ctx = context(Method::Get, false);
        ctx.set_header("Content-Type", "text/csv").unwrap();
        let res = ctx.text(
            "a,b",
            ResponseInit::new()
                .header("Content-Type", "text/markdown")
                .header("X-Call", "1"),
        );
        assert_eq!(res.headers.get("Content-Type"), Some("text/csv"));
        assert_eq!(res.headers.get("X-Call"), Some("1"));
    }

    #[test]
    fn test_status_precedence() {
        let mut ctx = context(Method::Get, false);
        let res = ctx.text("made", ResponseInit::new().status(201));
        assert_eq!((res.status, res.status_text.as_str()), (201, "Created"));

        ctx.status(418).status_text("Teapot");
        let res = ctx.text("brew", ResponseInit::new().status(201));
        assert_eq!((res.status, res.status_text.as_str()), (418, "Teapot"));
    }

    #[test]
    fn test_freshness_reset() {
        let mut ctx = context(Method::Get, false);
        ctx.set_header("X-Custom", "one").unwrap();
        assert!(!ctx.is_fresh());

        let first = ctx.text("first", None);
        assert_eq!(first.headers.get("X-Custom"), Some("one"));
        assert!(ctx.is_fresh());

        let second = ctx.text("second", None);
        assert!(second.headers.get("X-Custom").is_none());
    }

    #[test]
    fn test_head_keeps_content_length() {
        let mut ctx = context(Method::Head, false);
        let res = ctx.text("pong", None);
        assert!(res.body.is_empty());
        assert_eq!(res.headers.get("Content-Length"), Some("4"));
    }

    #[test]
    fn test_etag_only_below_error_range() {
        let mut ctx = context(Method::Get, true);
        let a = ctx.text("same", None);
        let b = ctx.text("same", None);
        assert!(a.headers.get("ETag").is_some());
        assert_eq!(a.headers.get("ETag"), b.headers.get("ETag"));

        ctx.status(500);
        let failed = ctx.text("same", None);
        assert!(failed.headers.get("ETag").is_none());
    }

    #[test]
    fn test_header_accessor() {
        let mut ctx = context(Method::Get, false);
        ctx.header().append("Vary", "Origin").unwrap();
        ctx.header().append("Vary", "Accept").unwrap();
        assert_eq!(ctx.header().get("vary"), Some("Origin, Accept"));

        let err = ctx.header().set("X-Empty", "").unwrap_err();
        assert!(matches!(err, Error::Handler(HandlerError::InvalidHeader)));
    }

    #[test]
    fn test_producer_defaults() {
        let mut ctx = context(Method::Get, false);
        let raw = ctx.raw(vec![1u8, 2, 3], None);
        assert!(raw.headers.get("Content-Type").is_none());
        assert_eq!(raw.body, vec![1, 2, 3]);

        let head = ctx.head(None);
        assert!(head.body.is_empty());
        assert_eq!(head.headers.get("Content-Length"), Some("0"));

        let view = ctx.render(serde_json::json!({"title": "home"}), None);
        assert_eq!(view.headers.get("Content-Type"), Some("text/html"));
        assert_eq!(view.body, br#"{"title":"home"}"#);

        let page = ctx.send("<p>hi</p>", None);
        assert_eq!(page.headers.get("Content-Type"), Some("text/html"));
    }

    #[test]
    fn test_not_found() {
        let mut ctx = context(Method::Delete, false);
        let res = ctx.not_found();
        assert_eq!(res.status, 404);
        assert_eq!(res.status_text, "Not Found");
        assert_eq!(res.body_string().as_deref(), Some("Cannot DELETE /ping"));
        assert_eq!(res.headers.get("Content-Type"), Some("text/plain"));
    }

    #[test]
    fn test_option_merges() {
        let mut ctx = context(Method::Get, false);
        ctx.option(ResponseInit::new().status(202).header("X-A", "1"));
        ctx.option(ResponseInit::new().header("X-B", "2"));
        let res = ctx.response("queued", None);
        assert_eq!(res.status, 202);
        assert_eq!(res.headers.get("X-A"), Some("1"));
        assert_eq!(res.headers.get("X-B"), Some("2"));
    }
}
