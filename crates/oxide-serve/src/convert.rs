//! Conversion between hyper messages and dispatch requests/responses.

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::ext::ReasonPhrase;
use hyper::{Request as HyperRequest, Response as HyperResponse, StatusCode};
use oxide_dispatch::{Method, Request, Response};
use thiserror::Error;
use tracing::warn;

/// A request refused before it reaches the application.
#[derive(Debug, Error)]
pub enum Rejection {
    /// The method is not one the router can serve.
    #[error("method {0} is not supported")]
    MethodNotAllowed(String),

    /// The body exceeded `max_request_body_size`.
    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    /// The body could not be read.
    #[error("failed to read request body: {0}")]
    Body(String),
}

impl Rejection {
    /// Status code sent back for this rejection.
    pub const fn status(&self) -> u16 {
        match self {
            Self::MethodNotAllowed(_) => 405,
            Self::PayloadTooLarge(_) => 413,
            Self::Body(_) => 400,
        }
    }

    /// Plain-text response describing the rejection.
    pub fn into_response(self) -> HyperResponse<Full<Bytes>> {
        into_hyper(Response::text(self.to_string()).status(self.status()))
    }
}

/// Reads a hyper request into a dispatch [`Request`], buffering at most
/// `limit` body bytes.
pub async fn into_request<B>(req: HyperRequest<B>, limit: usize) -> Result<Request, Rejection>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = req.into_parts();

    let method = Method::parse(parts.method.as_str())
        .ok()
        .filter(|method| method.is_http())
        .ok_or_else(|| Rejection::MethodNotAllowed(parts.method.to_string()))?;

    let target = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
    let mut request = Request::from_target(method, target);

    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            request.headers.append(name.as_str(), value);
        }
    }

    let collected = Limited::new(body, limit).collect().await.map_err(|err| {
        if err.downcast_ref::<LengthLimitError>().is_some() {
            Rejection::PayloadTooLarge(limit)
        } else {
            Rejection::Body(err.to_string())
        }
    })?;
    request.body = collected.to_bytes().to_vec();

    Ok(request)
}

/// Converts a dispatch [`Response`] into a hyper response.
///
/// A status outside `100..=999` becomes 500. A status text differing from
/// the canonical reason is sent as a custom reason phrase.
pub fn into_hyper(res: Response) -> HyperResponse<Full<Bytes>> {
    let status = StatusCode::from_u16(res.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = HyperResponse::builder().status(status);

    for (key, value) in res.headers.iter() {
        builder = builder.header(key, value);
    }

    if status.canonical_reason() != Some(res.status_text.as_str()) {
        if let Ok(reason) = ReasonPhrase::try_from(res.status_text) {
            builder = builder.extension(reason);
        }
    }

    builder
        .body(Full::new(Bytes::from(res.body)))
        .unwrap_or_else(|err| {
            warn!(error = %err, "invalid response, sending 500 instead");
            internal_error(Bytes::from_static(b"Internal Server Error"))
        })
}

/// Bare 500 response.
pub(crate) fn internal_error(body: Bytes) -> HyperResponse<Full<Bytes>> {
    let mut res = HyperResponse::new(Full::new(body));
    *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    res
}
