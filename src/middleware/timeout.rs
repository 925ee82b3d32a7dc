//! Cooperative request deadlines.

use std::time::Duration;

use crate::capture::ResponseCapture;
use crate::context::Deadline;
use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;

/// Attaches a [`Deadline`] of `timeout` after the request was received.
///
/// The deadline is released (cancelled) as soon as the inner chain returns,
/// including when it unwinds. Nothing is aborted on expiry: a handler that
/// never looks at the deadline runs to completion and its response is sent
/// as written.
pub struct TimeoutGuard {
    timeout: Duration,
}

impl TimeoutGuard {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Middleware for TimeoutGuard {
    fn name(&self) -> &'static str {
        "timeout"
    }

    fn process<'a>(&'a self, w: &'a mut ResponseCapture, mut req: Request, next: Next<'a>) -> BoxFuture<'a> {
        let ctx = req.context_mut();
        let expires_at = ctx.received_at() + self.timeout;
        let deadline = match ctx.deadline() {
            Some(parent) => parent.child(expires_at),
            None => Deadline::new(expires_at),
        };
        let release = deadline.release_guard();
        ctx.set_deadline(deadline);

        Box::pin(async move {
            let _release = release;
            next.run(w, req).await
        })
    }
}
