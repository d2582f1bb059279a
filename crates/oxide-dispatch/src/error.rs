//! Error types for routing and dispatch.

use thiserror::Error;

/// Route registration errors.
///
/// These are raised while the route table is being built and should abort
/// startup rather than be handled per request.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A route path did not start with `/`.
    #[error("invalid path {0:?}, route path must start with /")]
    InvalidPath(String),

    /// A router or application prefix did not start with `/`.
    #[error("invalid prefix {0:?}, routes prefix must start with /")]
    InvalidPrefix(String),

    /// A route was registered without any handler.
    #[error("invalid route {0}, at least one handler is required")]
    EmptyChain(String),

    /// The method is unknown or cannot be registered (`HEAD`).
    #[error(
        "unsupported method {0:?}, accepted methods are: GET POST PUT PATCH DELETE CONNECT OPTIONS TRACE WS"
    )]
    UnsupportedMethod(String),

    /// A WebSocket handler was placed anywhere but the end of a `WS` chain.
    #[error("invalid route {0}, a websocket handler must terminate a WS route")]
    MisplacedSocketHandler(String),

    /// The path trie refused the pattern.
    #[error("route {path} conflicts with an existing route: {message}")]
    Conflict {
        /// The pattern being defined.
        path: String,
        /// Reason reported by the trie.
        message: String,
    },
}

/// Contract violations detected while serving.
///
/// Like [`ValidationError`] these are configuration mistakes, so they are
/// never routed through the application error handler.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `WebSocketHandler::upgrade` returned something other than an object.
    #[error("websocket upgrade data must be a JSON object, got {0}")]
    InvalidUpgradeData(&'static str),
}

/// Failures of the middleware protocol itself.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A continuation was replayed or issued for another step.
    #[error("next() called multiple times (middleware {index})")]
    DoubleContinuation {
        /// Chain index of the middleware that returned the continuation.
        index: usize,
    },

    /// The terminal handler continued instead of producing a response.
    #[error("handler for {method} {path} produced no response")]
    NoResponse {
        /// Request method.
        method: String,
        /// Request path.
        path: String,
    },
}

/// Errors raised by user middleware and handlers.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Header key or value was empty.
    #[error("headers key or value should not be empty")]
    InvalidHeader,

    /// A response body could not be serialized.
    #[error("failed to serialize response body: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The WebSocket peer is gone.
    #[error("websocket connection is closed")]
    SocketClosed,

    /// Free-form failure message.
    #[error("{0}")]
    Message(String),

    /// Any other error produced by application code.
    #[error(transparent)]
    Custom(Box<dyn std::error::Error + Send + Sync>),
}

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// See [`ValidationError`].
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// See [`ConfigError`].
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// See [`DispatchError`].
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// See [`HandlerError`].
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

impl Error {
    /// Creates a handler error from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Handler(HandlerError::Message(message.into()))
    }

    /// Wraps an arbitrary application error.
    pub fn custom<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Handler(HandlerError::Custom(Box::new(err)))
    }

    /// Returns `true` for configuration mistakes that must not be recovered
    /// per request.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Config(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Handler(HandlerError::Serialize(err))
    }
}

/// Result type alias for dispatch operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::from(ValidationError::InvalidPath("users".into())).is_fatal());
        assert!(Error::from(ConfigError::InvalidUpgradeData("array")).is_fatal());
        assert!(!Error::msg("boom").is_fatal());
        assert!(!Error::from(DispatchError::DoubleContinuation { index: 1 }).is_fatal());
    }

    #[test]
    fn test_messages() {
        let err = Error::from(ValidationError::EmptyChain("/users".into()));
        assert_eq!(
            err.to_string(),
            "invalid route /users, at least one handler is required"
        );
        assert_eq!(Error::msg("boom").to_string(), "boom");
    }
}
