//! Per-request tracing span and access log.

use std::time::Instant;

use tracing::{Instrument, debug, info_span};

use crate::capture::ResponseCapture;
use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;

/// Runs the inner chain inside a `request` span carrying method, path and
/// trace id, and logs start and completion at debug level.
pub struct RequestLog;

impl Middleware for RequestLog {
    fn name(&self) -> &'static str {
        "request-log"
    }

    fn process<'a>(&'a self, w: &'a mut ResponseCapture, req: Request, next: Next<'a>) -> BoxFuture<'a> {
        let span = info_span!(
            "request",
            method = %req.method(),
            path = req.path(),
            trace_id = req.context().trace_id(),
        );

        Box::pin(
            async move {
                let start = Instant::now();
                debug!("http request started");
                let outcome = next.run(w, req).await;
                let status = match &outcome {
                    Ok(()) => w.status(),
                    Err(failure) => failure.status(),
                };
                debug!(%status, duration = ?start.elapsed(), "http request served");
                outcome
            }
            .instrument(span),
        )
    }
}
