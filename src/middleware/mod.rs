//! Middleware layer.
//!
//! Middleware intercepts a request on its way to the terminal handler and is
//! the place for cross-cutting concerns. A [`MiddlewareChain`] is an ordered
//! list of stages; the first stage added is the outermost:
//!
//! ```text
//! chain [m1, m2, m3] + handler h   ≡   m1(m2(m3(h)))
//!
//! m1 enter → m2 enter → m3 enter → h → m3 exit → m2 exit → m1 exit
//! ```
//!
//! Order is entirely the caller's choice. The usual layering:
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use albgate::middleware::{AlbAuth, MiddlewareChain, PanicGuard, RequestLog, TimeoutGuard};
//! use albgate::{Failure, Json, Request};
//!
//! async fn me(req: Request) -> Result<Json<Option<String>>, Failure> {
//!     Ok(Json::ok(req.context().email().map(str::to_owned)))
//! }
//!
//! let pipeline = MiddlewareChain::new()
//!     .with(PanicGuard::new())                        // outermost: sees every panic
//!     .with(RequestLog)
//!     .with(TimeoutGuard::new(Duration::from_secs(25)))
//!     .with(AlbAuth::new())
//!     .handler(me);                                   // innermost
//! ```
//!
//! A stage short-circuits by returning without calling [`Next::run`].
//! Failures travel back up as [`Outcome`] values and are rendered once by
//! [`Pipeline::serve`].

mod auth;
mod panic;
mod timeout;
mod trace;

pub use auth::{API_KEY_HEADER, AlbAuth, ApiKey, DEFAULT_ROLE_CLAIM, OIDC_DATA_HEADER, decode_claims};
pub use panic::PanicGuard;
pub use timeout::TimeoutGuard;
pub use trace::RequestLog;

use std::sync::Arc;

use tracing::debug;

use crate::capture::ResponseCapture;
use crate::config::Config;
use crate::failure::Outcome;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler};
use crate::request::Request;
use crate::response::{TRACE_ID_HEADER, stamp_trace_id};

// ── Middleware trait ──────────────────────────────────────────────────────────

/// One stage of the request pipeline.
///
/// ```rust
/// use albgate::middleware::{Middleware, Next};
/// use albgate::{BoxFuture, Request, ResponseCapture};
///
/// struct Noop;
///
/// impl Middleware for Noop {
///     fn name(&self) -> &'static str { "noop" }
///
///     fn process<'a>(&'a self, w: &'a mut ResponseCapture, req: Request, next: Next<'a>) -> BoxFuture<'a> {
///         Box::pin(async move { next.run(w, req).await })
///     }
/// }
/// ```
pub trait Middleware: Send + Sync + 'static {
    /// Stage name for logs.
    fn name(&self) -> &'static str;

    fn process<'a>(&'a self, w: &'a mut ResponseCapture, req: Request, next: Next<'a>) -> BoxFuture<'a>;
}

/// The rest of the pipeline, as seen from one stage.
pub struct Next<'a> {
    stages: &'a [Box<dyn Middleware>],
    endpoint: &'a (dyn ErasedHandler + Send + Sync),
}

impl<'a> Next<'a> {
    /// Runs the remaining stages and then the terminal handler.
    ///
    /// `w` is only borrowed until the returned future completes, so the
    /// calling stage can inspect what was written afterwards.
    pub fn run<'b>(self, w: &'b mut ResponseCapture, req: Request) -> BoxFuture<'b>
    where
        'a: 'b,
    {
        match self.stages.split_first() {
            Some((stage, rest)) => stage.process(w, req, Next { stages: rest, endpoint: self.endpoint }),
            None => self.endpoint.call(w, req),
        }
    }
}

// ── Chain builder ─────────────────────────────────────────────────────────────

/// Ordered list of stages, outermost first.
#[derive(Default)]
pub struct MiddlewareChain {
    stages: Vec<Box<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stages every deployment wants, in their usual nesting:
    /// panic containment, request log, deadline, then the API-key check when
    /// a key is configured. Identity stages such as [`AlbAuth`] go after.
    pub fn from_config(config: &Config) -> Self {
        let chain = Self::new()
            .with(PanicGuard::new().expose_messages(config.expose_panic_messages))
            .with(RequestLog)
            .with(TimeoutGuard::new(config.request_timeout));

        match &config.api_key {
            Some(key) => chain.with(ApiKey::new(key.clone())),
            None => chain,
        }
    }

    /// Builds a chain from an already ordered list.
    pub fn from_stages(stages: Vec<Box<dyn Middleware>>) -> Self {
        Self { stages }
    }

    /// Appends `stage` inside every stage added so far.
    pub fn with(mut self, stage: impl Middleware) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Wraps `handler` in every stage, producing the composite handler.
    pub fn handler(self, handler: impl Handler) -> Pipeline {
        let names: Vec<_> = self.stages.iter().map(|s| s.name()).collect();
        debug!(stages = ?names, "pipeline assembled");
        Pipeline {
            inner: Arc::new(Inner { stages: self.stages, endpoint: handler.into_boxed_handler() }),
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// A composed chain plus its terminal handler.
///
/// Immutable once built and cheap to clone; share one across invocations.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

struct Inner {
    stages: Vec<Box<dyn Middleware>>,
    endpoint: BoxedHandler,
}

impl Pipeline {
    /// Runs the chain and returns its raw outcome, leaving failures unrendered.
    pub fn call<'a>(&'a self, w: &'a mut ResponseCapture, req: Request) -> BoxFuture<'a> {
        Next { stages: &self.inner.stages, endpoint: &*self.inner.endpoint }.run(w, req)
    }

    /// Serves one request into `w`.
    ///
    /// A failure that reaches the top of the chain replaces whatever was
    /// written with its JSON body. The trace header is always present
    /// afterwards, even if the handler wrote nothing.
    pub async fn serve(&self, w: &mut ResponseCapture, req: Request) {
        let trace_id = req.context().trace_id().to_owned();

        if let Err(failure) = self.call(w, req).await {
            debug!(status = %failure.status(), error = %failure, %trace_id, "request failed");
            failure.render(w, &trace_id);
        }

        if !w.headers().contains_key(TRACE_ID_HEADER) {
            stamp_trace_id(w, &trace_id);
        }
    }
}
