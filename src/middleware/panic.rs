//! Panic containment.
//!
//! [`PanicGuard`] turns a panic anywhere inside it into
//! [`Failure::Internal`], so one broken request is answered with a 500 and
//! the process keeps serving.
//!
//! The backtrace logged with the failure comes from the panic site, not from
//! the guard: building the first guard installs a process-wide panic hook
//! that records a bounded backtrace into a thread-local slot, which the guard
//! takes after unwinding. `catch_unwind` polls on the panicking thread, so
//! the slot always belongs to the request being recovered.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use futures_util::FutureExt as _;
use tracing::error;

use crate::capture::ResponseCapture;
use crate::failure::{Failure, INTERNAL_SERVER_ERROR};
use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;

/// Upper bound on the logged backtrace, in bytes.
const MAX_BACKTRACE: usize = 10 << 10;

thread_local! {
    static LAST_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

fn install_backtrace_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let backtrace = truncate(Backtrace::force_capture().to_string(), MAX_BACKTRACE);
            LAST_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(backtrace));
            previous(info);
        }));
    });
}

fn take_backtrace() -> String {
    LAST_BACKTRACE
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| truncate(Backtrace::force_capture().to_string(), MAX_BACKTRACE))
}

fn truncate(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
    s
}

/// Text of a panic payload: string payloads verbatim, error payloads by
/// their display text.
fn panic_message(payload: &(dyn Any + Send)) -> Option<String> {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        Some((*s).to_owned())
    } else if let Some(s) = payload.downcast_ref::<String>() {
        Some(s.clone())
    } else if let Some(failure) = payload.downcast_ref::<Failure>() {
        Some(failure.to_string())
    } else if let Some(e) = payload.downcast_ref::<Box<dyn std::error::Error + Send + Sync>>() {
        Some(e.to_string())
    } else {
        payload.downcast_ref::<crate::Error>().map(ToString::to_string)
    }
}

/// Recovers panics raised by the inner chain.
///
/// By default the client sees `"Internal Server Error"` and the real panic
/// message is only logged. [`expose_messages`](PanicGuard::expose_messages)
/// sends the raw message to the client instead, which leaks internals and is
/// meant for development.
pub struct PanicGuard {
    expose_messages: bool,
}

impl PanicGuard {
    pub fn new() -> Self {
        install_backtrace_hook();
        Self { expose_messages: false }
    }

    pub fn expose_messages(mut self, expose: bool) -> Self {
        self.expose_messages = expose;
        self
    }
}

impl Default for PanicGuard {
    fn default() -> Self { Self::new() }
}

impl Middleware for PanicGuard {
    fn name(&self) -> &'static str {
        "panic-guard"
    }

    fn process<'a>(&'a self, w: &'a mut ResponseCapture, req: Request, next: Next<'a>) -> BoxFuture<'a> {
        let method = req.method().clone();
        let path = req.path().to_owned();
        let trace_id = req.context().trace_id().to_owned();

        Box::pin(async move {
            // Building the inner future runs stage and handler preambles, so
            // it has to happen inside the unwind boundary too.
            let inner = async move { next.run(w, req).await };
            let payload = match AssertUnwindSafe(inner).catch_unwind().await {
                Ok(outcome) => return outcome,
                Err(payload) => payload,
            };

            let raised = panic_message(&*payload);
            let backtrace = take_backtrace();
            error!(
                %method,
                %path,
                %trace_id,
                error = raised.as_deref().unwrap_or("<non-string panic payload>"),
                stack_trace = backtrace.as_str(),
                "panic recovered"
            );

            let message = match raised {
                Some(message) if self.expose_messages => message,
                _ => INTERNAL_SERVER_ERROR.to_owned(),
            };
            Err(Failure::Internal(message))
        })
    }
}
