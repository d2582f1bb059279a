//! Middleware dispatch.
//!
//! A chain is a list of middleware run strictly in order against one
//! [`Context`]. Each middleware receives a [`Next`] token and resolves to
//! one of three outcomes:
//!
//! - `Ok(next.proceed())` hands control to the following middleware,
//! - `Ok(Flow::Respond(response))` ends the chain with a response,
//! - `Err(error)` (or `next.fail(error)`) rejects the whole chain.
//!
//! `Next` is consumed by `proceed` and `fail`, so continuing twice from one
//! invocation is rejected by the compiler:
//!
//! ```compile_fail
//! use oxide_dispatch::middleware;
//!
//! let twice = middleware(|_ctx, next| {
//!     Box::pin(async move {
//!         let _ = next.proceed();
//!         Ok(next.proceed())
//!     })
//! });
//! ```
//!
//! A token can still be stored and replayed later; [`compose`] detects a
//! continuation that was not issued for the step being dispatched and fails
//! with [`DispatchError::DoubleContinuation`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::BoxFuture;
use tracing::{info, trace};

use crate::context::Context;
use crate::error::{DispatchError, Error, Result};
use crate::response::Response;

/// Source of compose-call ids. Each dispatch gets a fresh id so tokens
/// issued for another dispatch never match.
static DISPATCH_ID: AtomicU64 = AtomicU64::new(0);

fn next_dispatch_id() -> u64 {
    DISPATCH_ID.fetch_add(1, Ordering::Relaxed)
}

/// Continuation token handed to a middleware.
#[derive(Debug)]
pub struct Next {
    call: u64,
    index: usize,
}

impl Next {
    /// Continues with the following middleware.
    #[must_use]
    pub const fn proceed(self) -> Flow {
        Flow::Continue(Continuation {
            call: self.call,
            index: self.index,
        })
    }

    /// Rejects the chain with `err`.
    pub fn fail<E: Into<Error>>(self, err: E) -> Result<Flow> {
        Err(err.into())
    }

    /// Position of the middleware in its chain.
    pub const fn index(&self) -> usize {
        self.index
    }
}

/// Proof that a middleware continued, produced by [`Next::proceed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Continuation {
    call: u64,
    index: usize,
}

/// Outcome of one middleware.
#[derive(Debug)]
pub enum Flow {
    /// Run the following middleware.
    Continue(Continuation),
    /// Stop the chain with this response.
    Respond(Response),
}

impl From<Response> for Flow {
    fn from(response: Response) -> Self {
        Self::Respond(response)
    }
}

/// A chain element.
///
/// # Example
///
/// ```ignore
/// struct RequireJson;
///
/// impl Middleware for RequireJson {
///     fn call<'a>(&'a self, ctx: &'a mut Context, next: Next) -> BoxFuture<'a, Result<Flow>> {
///         Box::pin(async move {
///             if ctx.request.get_header("Content-Type") == Some("application/json") {
///                 return Ok(next.proceed());
///             }
///             Ok(ctx.text("expected JSON", ResponseInit::new().status(415)).into())
///         })
///     }
/// }
/// ```
pub trait Middleware: Send + Sync {
    /// Runs this middleware.
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next) -> BoxFuture<'a, Result<Flow>>;
}

/// Runs `chain` in order against `ctx`.
///
/// Returns `Ok(Some(response))` when a middleware short-circuits and
/// `Ok(None)` when the end of the chain is reached (including for an empty
/// chain).
pub async fn compose(ctx: &mut Context, chain: &[Arc<dyn Middleware>]) -> Result<Option<Response>> {
    let call = next_dispatch_id();

    for (index, middleware) in chain.iter().enumerate() {
        trace!(call, index, "dispatching middleware");
        match middleware.call(ctx, Next { call, index }).await? {
            Flow::Respond(response) => {
                trace!(call, index, status = response.status, "chain short-circuited");
                return Ok(Some(response));
            }
            Flow::Continue(cont) if cont.call == call && cont.index == index => {}
            Flow::Continue(_) => {
                return Err(DispatchError::DoubleContinuation { index }.into());
            }
        }
    }

    Ok(None)
}

/// Runs the terminal handler of a route. Continuing from a terminal
/// handler is an error since nothing follows it.
pub async fn run_terminal(ctx: &mut Context, terminal: &Arc<dyn Middleware>) -> Result<Response> {
    let call = next_dispatch_id();
    match terminal.call(ctx, Next { call, index: 0 }).await? {
        Flow::Respond(response) => Ok(response),
        Flow::Continue(_) => Err(DispatchError::NoResponse {
            method: ctx.method().to_string(),
            path: ctx.request.path.clone(),
        }
        .into()),
    }
}

/// Middleware backed by a closure. Built with [`middleware`].
pub struct MiddlewareFn<F>(F);

impl<F> Middleware for MiddlewareFn<F>
where
    F: for<'a> Fn(&'a mut Context, Next) -> BoxFuture<'a, Result<Flow>> + Send + Sync,
{
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next) -> BoxFuture<'a, Result<Flow>> {
        (self.0)(ctx, next)
    }
}

/// Wraps a closure as middleware.
///
/// ```ignore
/// let auth = middleware(|ctx, next| Box::pin(async move {
///     if ctx.request.get_header("Authorization").is_none() {
///         return Ok(ctx.text("Unauthorized", ResponseInit::new().status(401)).into());
///     }
///     Ok(next.proceed())
/// }));
/// ```
pub fn middleware<F>(f: F) -> Arc<dyn Middleware>
where
    F: for<'a> Fn(&'a mut Context, Next) -> BoxFuture<'a, Result<Flow>> + Send + Sync + 'static,
{
    Arc::new(MiddlewareFn(f))
}

/// Terminal handler backed by a closure. Built with [`handler`].
pub struct HandlerFn<F>(F);

impl<F> Middleware for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Result<Response>> + Send + Sync,
{
    fn call<'a>(&'a self, ctx: &'a mut Context, _next: Next) -> BoxFuture<'a, Result<Flow>> {
        let fut = (self.0)(ctx);
        Box::pin(async move { fut.await.map(Flow::Respond) })
    }
}

/// Wraps a closure that always produces a response.
///
/// ```ignore
/// let hello = handler(|ctx| Box::pin(async move { Ok(ctx.text("hello", None)) }));
/// ```
pub fn handler<F>(f: F) -> Arc<dyn Middleware>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Result<Response>> + Send + Sync + 'static,
{
    Arc::new(HandlerFn(f))
}

/// Middleware that logs requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct Logger;

impl Middleware for Logger {
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next) -> BoxFuture<'a, Result<Flow>> {
        Box::pin(async move {
            info!(method = %ctx.method(), path = %ctx.request.path, "request");
            Ok(next.proceed())
        })
    }
}
