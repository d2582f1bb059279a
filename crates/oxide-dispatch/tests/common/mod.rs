#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use oxide_dispatch::{App, Middleware, Request, Response, Server, ServerOptions, handler, middleware};

pub type Log = Arc<Mutex<Vec<usize>>>;

pub fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<usize> {
    log.lock().unwrap().clone()
}

/// Terminal handler answering with fixed text.
pub fn text(body: &'static str) -> Arc<dyn Middleware> {
    handler(move |ctx| Box::pin(async move { Ok(ctx.text(body, None)) }))
}

/// Middleware that appends `index` to `log` and continues.
pub fn record(log: &Log, index: usize) -> Arc<dyn Middleware> {
    let log = Arc::clone(log);
    middleware(move |_ctx, next| {
        let log = Arc::clone(&log);
        Box::pin(async move {
            tokio::task::yield_now().await;
            log.lock().unwrap().push(index);
            Ok(next.proceed())
        })
    })
}

pub fn build(options: ServerOptions, setup: impl FnOnce(&mut App)) -> Server {
    let mut app = App::new(options);
    setup(&mut app);
    app.build()
        .unwrap_or_else(|e| panic!("Failed to build app: {e}"))
}

pub async fn send(server: &Server, request: Request) -> Response {
    server
        .handle(request)
        .await
        .unwrap_or_else(|e| panic!("Request failed: {e}"))
}

pub fn body(response: &Response) -> String {
    response.body_string().unwrap_or_default()
}
