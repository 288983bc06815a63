//! HTTP server loop.

use std::convert::Infallible;
use std::io;
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::debug;

use super::router::{self, App};

/// Accept loop: one task per connection, HTTP/1 on plain TCP. Runs
/// until the listener errors or the enclosing task is dropped.
pub async fn run(listener: TcpListener, app: Arc<App>) -> io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let app = app.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |request| {
                let app = app.clone();
                async move { Ok::<_, Infallible>(router::handle(app, request).await) }
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                debug!("connection error from {}: {:?}", peer, err);
            }
        });
    }
}
