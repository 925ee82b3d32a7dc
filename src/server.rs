//! Local HTTP server and graceful shutdown.
//!
//! On the function host requests arrive as events through
//! [`ProxyAdapter`](crate::ProxyAdapter). For local development the same
//! [`Pipeline`] can be served over plain HTTP instead: every connection
//! request is collected, wrapped into a [`Request`] and run through
//! [`Pipeline::serve`] exactly like a decoded event would be.
//!
//! The server reacts to SIGTERM or Ctrl-C by:
//! 1. Immediately stopping `listener.accept()`, so no new connections are made.
//! 2. Letting every in-flight connection task run to completion.
//! 3. Returning from [`Server::serve`], which lets `main` exit cleanly.

use std::convert::Infallible;
use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::capture::ResponseCapture;
use crate::error::{Error, Result};
use crate::failure::Failure;
use crate::middleware::Pipeline;
use crate::request::Request;

/// The local HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust
    /// use albgate::Server;
    /// let _server = Server::bind("127.0.0.1:3000").unwrap();
    /// assert!(Server::bind("localhost").is_err());
    /// ```
    pub fn bind(addr: &str) -> Result<Self> {
        let addr = addr.parse().map_err(|e| Error::Config(format!("invalid socket address {addr:?}: {e}")))?;
        Ok(Self { addr })
    }

    pub fn from_addr(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Starts accepting connections and running every request through
    /// `pipeline`.
    ///
    /// Returns only after a full graceful shutdown.
    pub async fn serve(self, pipeline: Pipeline) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, "albgate listening");

        // Every spawned connection task, so shutdown can wait for them.
        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Shutdown is checked first so a SIGTERM stops accepting
                // even while connections are queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let pipeline = pipeline.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let pipeline = pipeline.clone();
                            async move { dispatch(pipeline, req).await }
                        });

                        // HTTP/1.1 or HTTP/2, whatever the client negotiates.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished tasks so the set does not grow without bound.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("albgate stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Collects one request body and serves it through the pipeline.
///
/// Every failure is turned into a response here so hyper never sees an error.
async fn dispatch(
    pipeline: Pipeline,
    req: hyper::Request<Incoming>,
) -> std::result::Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let mut capture = ResponseCapture::new();

    match body.collect().await {
        Ok(collected) => {
            let req = Request::from_http(http::Request::from_parts(parts, collected.to_bytes()));
            pipeline.serve(&mut capture, req).await;
        }
        Err(e) => {
            warn!(error = %e, "could not read request body");
            Failure::bad_request("invalid request body").render(&mut capture, "");
        }
    }

    Ok(capture.into_response().map(Full::new))
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or Ctrl-C. A signal handler that cannot be
/// installed is logged and treated as never firing.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
