//! Handler trait and type erasure.
//!
//! # How terminal handlers are stored
//!
//! A [`Pipeline`](crate::middleware::Pipeline) holds exactly one terminal
//! handler, whatever its concrete type, behind a trait object
//! (`dyn ErasedHandler`).
//!
//! The chain from user code to vtable call is:
//!
//! ```text
//! async fn me(req: Request) -> Result<Json<Me>, Failure> { … }   ← user writes this
//!        ↓ chain.handler(me)
//! me.into_boxed_handler()                                       ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(me))                                       ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(w, req)  at request time                         ← one vtable dispatch
//!        ↓
//! Box::pin(async { me(req).await?.respond(w, &trace_id) })      ← BoxFuture
//! ```
//!
//! The handler never sees the [`ResponseCapture`]: it returns a value and
//! the wrapper writes it, so a handler cannot forget the trace header or the
//! JSON content type.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::capture::ResponseCapture;
use crate::failure::{Failure, Outcome};
use crate::request::Request;
use crate::response::Respond;

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future that resolves to an [`Outcome`].
///
/// Borrows the stage and the response capture for `'a`; `Send` lets tokio
/// move it across worker threads between polls.
pub type BoxFuture<'a> = Pin<Box<dyn Future<Output = Outcome> + Send + 'a>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call<'a>(&'a self, w: &'a mut ResponseCapture, req: Request) -> BoxFuture<'a>;
}

/// A heap-allocated, type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid terminal handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` with the signature:
///
/// ```text
/// async fn name(req: Request) -> Result<impl Respond, Failure>
/// ```
///
/// The trait is **sealed**: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Failure>> + Send + 'static,
    R: Respond + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Failure>> + Send + 'static,
    R: Respond + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

/// Bridges a concrete handler `F` to [`ErasedHandler`].
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, Failure>> + Send + 'static,
    R: Respond + Send + 'static,
{
    fn call<'a>(&'a self, w: &'a mut ResponseCapture, req: Request) -> BoxFuture<'a> {
        let trace_id = req.context().trace_id().to_owned();
        let fut = (self.0)(req);
        Box::pin(async move {
            fut.await?.respond(w, &trace_id);
            Ok(())
        })
    }
}
