//! HTTP response type.

use crate::headers::Headers;

/// An HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Status line reason phrase.
    pub status_text: String,
    /// Response headers.
    pub headers: Headers,
    /// Response body.
    pub body: Vec<u8>,
}

impl Response {
    /// Creates a new response with the given status and its canonical
    /// reason phrase.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            status_text: reason_phrase(status).to_string(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Creates a 200 OK response.
    pub fn ok() -> Self {
        Self::new(200)
    }

    /// Creates a response with plain text content.
    pub fn text(body: impl Into<String>) -> Self {
        Self::ok()
            .header("Content-Type", "text/plain")
            .body(body.into())
    }

    /// Creates a 500 Internal Server Error response.
    pub fn internal_server_error() -> Self {
        Self::new(500)
            .header("Content-Type", "text/plain")
            .body("Internal Server Error")
    }

    /// Sets a header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(key, value);
        self
    }

    /// Sets the status code and resets the reason phrase.
    #[must_use]
    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self.status_text = reason_phrase(status).to_string();
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the body as a string.
    pub fn body_string(&self) -> Option<String> {
        String::from_utf8(self.body.clone()).ok()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::ok()
    }
}

/// Returns the canonical reason phrase for a status code.
pub const fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

/// Partial response directives: the `init` argument of the context's
/// terminal producers and the argument of `Context::option`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseInit {
    /// Status code override.
    pub status: Option<u16>,
    /// Reason phrase override.
    pub status_text: Option<String>,
    /// Headers to merge.
    pub headers: Headers,
}

impl ResponseInit {
    /// Creates empty directives.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the status code.
    #[must_use]
    pub const fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the reason phrase.
    #[must_use]
    pub fn status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = Some(text.into());
        self
    }

    /// Sets a header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(key, value);
        self
    }

    /// Overlays `other` on top of these directives; `other` wins.
    pub fn merge(&mut self, other: Self) {
        if other.status.is_some() {
            self.status = other.status;
        }
        if other.status_text.is_some() {
            self.status_text = other.status_text;
        }
        self.headers.merge(&other.headers);
    }

    /// Returns `true` when no directive is set.
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.status_text.is_none() && self.headers.is_empty()
    }
}

/// A response body before finalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    /// No body.
    #[default]
    Empty,
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// A structured value, serialized to JSON at finalize time.
    Json(serde_json::Value),
}

impl Body {
    /// Serializes the body to bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Empty => Vec::new(),
            Self::Text(text) => text.into_bytes(),
            Self::Bytes(bytes) => bytes,
            Self::Json(value) => value.to_string().into_bytes(),
        }
    }
}

impl From<()> for Body {
    fn from((): ()) -> Self {
        Self::Empty
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for Body {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(text) => Self::Text(text),
            other => Self::Json(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_builder() {
        let res = Response::ok().header("X-Custom", "value").body("Hello");

        assert_eq!(res.status, 200);
        assert_eq!(res.status_text, "OK");
        assert_eq!(res.headers.get("x-custom"), Some("value"));
        assert_eq!(res.body_string(), Some("Hello".to_string()));
    }

    #[test]
    fn test_status_resets_reason() {
        let res = Response::ok().status(404);
        assert_eq!(res.status_text, "Not Found");
        assert_eq!(Response::new(599).status_text, "Unknown");
    }

    #[test]
    fn test_init_merge() {
        let mut base = ResponseInit::new()
            .status(200)
            .header("Content-Type", "text/plain");
        base.merge(ResponseInit::new().status(201).header("X-Id", "7"));
        assert_eq!(base.status, Some(201));
        assert_eq!(base.headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(base.headers.get("X-Id"), Some("7"));
        assert!(!base.is_empty());
        assert!(ResponseInit::new().is_empty());
    }

    #[test]
    fn test_body_serialization() {
        let body = Body::from(serde_json::json!({"ok": true}));
        assert_eq!(body.into_bytes(), br#"{"ok":true}"#.to_vec());
        assert_eq!(Body::from(serde_json::json!("hi")), Body::Text("hi".into()));
        assert!(Body::from(()).into_bytes().is_empty());
    }
}
