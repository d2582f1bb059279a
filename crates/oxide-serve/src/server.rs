//! Listener loops and per-request glue.

use std::convert::Infallible;
use std::future::Future;
use std::io;
#[cfg(unix)]
use std::path::Path;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request as HyperRequest, Response as HyperResponse};
use hyper_util::rt::TokioIo;
use oxide_dispatch::{Dispatched, Error, Server};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{debug, error, info, trace};

use crate::convert::{internal_error, into_hyper, into_request};
use crate::socket::SocketUpgrade;

/// Binds the address configured in the server options and serves until
/// `shutdown` resolves.
///
/// A configured `unix` socket path takes precedence over `hostname` and
/// `port` on Unix platforms.
pub async fn serve<F>(server: Arc<Server>, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()>,
{
    #[cfg(unix)]
    if let Some(path) = server.options().unix.clone() {
        let listener = bind_unix(&path).await?;
        info!(path = %path.display(), "listening on unix socket");
        let served = serve_unix(listener, server, shutdown).await;
        if let Err(err) = tokio::fs::remove_file(&path).await {
            debug!(path = %path.display(), error = %err, "could not remove unix socket");
        }
        return served;
    }

    let hostname = server.options().hostname.clone();
    let port = server.options().port;
    let listener = TcpListener::bind((hostname.as_str(), port)).await?;
    info!(addr = %listener.local_addr()?, "listening");
    serve_listener(listener, server, shutdown).await
}

/// Accepts TCP connections until `shutdown` resolves.
pub async fn serve_listener<F>(
    listener: TcpListener,
    server: Arc<Server>,
    shutdown: F,
) -> io::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                trace!(%peer, "accepted connection");
                tokio::spawn(serve_connection(stream, Arc::clone(&server)));
            }
        }
    }
}

/// Binds a unix listener at `path`, replacing a socket file left behind by
/// an earlier run. Any other kind of file at `path` is left alone.
#[cfg(unix)]
async fn bind_unix(path: &Path) -> io::Result<tokio::net::UnixListener> {
    use std::os::unix::fs::FileTypeExt;

    let stale = tokio::fs::symlink_metadata(path)
        .await
        .is_ok_and(|metadata| metadata.file_type().is_socket());
    if stale {
        debug!(path = %path.display(), "removing stale unix socket");
        tokio::fs::remove_file(path).await?;
    }
    tokio::net::UnixListener::bind(path)
}

#[cfg(unix)]
async fn serve_unix<F>(
    listener: tokio::net::UnixListener,
    server: Arc<Server>,
    shutdown: F,
) -> io::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, _) = accepted?;
                tokio::spawn(serve_connection(stream, Arc::clone(&server)));
            }
        }
    }
}

/// Serves HTTP/1.1 on one connection, with upgrades enabled.
pub async fn serve_connection<S>(stream: S, server: Arc<Server>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| handle_request(req, Arc::clone(&server)));

    if let Err(err) = http1::Builder::new()
        .serve_connection(io, service)
        .with_upgrades()
        .await
    {
        debug!(error = %err, "error serving connection");
    }
}

/// Converts, dispatches and answers one request.
pub async fn handle_request(
    mut req: HyperRequest<Incoming>,
    server: Arc<Server>,
) -> Result<HyperResponse<Full<Bytes>>, Infallible> {
    let mut upgrade = SocketUpgrade::from_request(&mut req);

    let request = match into_request(req, server.options().max_request_body_size).await {
        Ok(request) => request,
        Err(rejection) => {
            debug!(error = %rejection, "request rejected");
            return Ok(rejection.into_response());
        }
    };
    let method = request.method;
    let path = request.path.clone();

    let response = match server.fetch(request, &mut upgrade).await {
        Ok(Dispatched::Response(res)) => into_hyper(res),
        Ok(Dispatched::Upgraded) => upgrade.switching_protocols(),
        Err(err) => failure(&server, &err),
    };

    debug!(%method, %path, status = response.status().as_u16(), "request served");
    Ok(response)
}

/// 500 for an error the application re-raised. The message is only
/// exposed in development.
fn failure(server: &Server, err: &Error) -> HyperResponse<Full<Bytes>> {
    error!(error = %err, "request failed");
    if server.options().is_development() {
        internal_error(Bytes::from(err.to_string()))
    } else {
        internal_error(Bytes::from_static(b"Internal Server Error"))
    }
}
