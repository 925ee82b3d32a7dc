//! The invocation boundary.
//!
//! ```text
//! InboundEvent ─► EventCodec::decode ─► Request
//!                                          │
//!                        Pipeline::serve(&mut ResponseCapture, Request)
//!                                          │
//! OutboundEvent ◄─ EventCodec::encode ◄─ ResponseCapture::into_response
//! ```
//!
//! [`ProxyAdapter::handle`] has no error path. When the adapter cannot trust
//! its own translation of the event it answers with
//! [`OutboundEvent::gateway_timeout`]: the host would otherwise report an
//! opaque invocation failure, which is harder to diagnose than a logged 504.

use std::panic::AssertUnwindSafe;

use futures_util::FutureExt as _;
use serde::Deserialize as _;
use serde_json::Value;
use tracing::{debug, error};

use crate::capture::ResponseCapture;
use crate::codec::{AlbCodec, EventCodec};
use crate::event::{InboundEvent, OutboundEvent};
use crate::middleware::Pipeline;

/// Serves one proxy event per call through a [`Pipeline`].
pub struct ProxyAdapter<C = AlbCodec> {
    pipeline: Pipeline,
    codec: C,
}

impl ProxyAdapter {
    pub fn new(pipeline: Pipeline) -> Self {
        Self::with_codec(pipeline, AlbCodec)
    }
}

impl<C: EventCodec> ProxyAdapter<C> {
    pub fn with_codec(pipeline: Pipeline, codec: C) -> Self {
        Self { pipeline, codec }
    }

    /// Deserializes a raw invocation payload and serves it. A payload that
    /// is not a target-group event gets the gateway-timeout reply.
    pub async fn handle_value(&self, payload: Value) -> OutboundEvent {
        match InboundEvent::deserialize(&payload) {
            Ok(event) => self.handle(event).await,
            Err(e) => {
                error!(error = %e, event = %payload, "could not parse proxy event");
                OutboundEvent::gateway_timeout()
            }
        }
    }

    /// Serves one event. Always returns a well-formed reply.
    pub async fn handle(&self, event: InboundEvent) -> OutboundEvent {
        debug!(?event, "received target group event");

        let req = match self.codec.decode(&event) {
            Ok(req) => req,
            Err(e) => {
                error!(error = %e, ?event, "could not convert proxy event to request");
                return OutboundEvent::gateway_timeout();
            }
        };
        debug!(method = %req.method(), uri = %req.uri(), headers = ?req.headers(), "converted proxy event to request");

        let trace_id = req.context().trace_id().to_owned();
        let mut capture = ResponseCapture::new();
        let served = AssertUnwindSafe(self.pipeline.serve(&mut capture, req)).catch_unwind().await;
        if served.is_err() {
            // Only reachable when the pipeline has no PanicGuard.
            error!(%trace_id, "panic escaped the middleware chain");
            return OutboundEvent::gateway_timeout();
        }

        match self.codec.encode(capture.into_response(), event.uses_multi_value_headers()) {
            Ok(out) => {
                debug!(?out, "generated proxy response");
                out
            }
            Err(e) => {
                error!(error = %e, %trace_id, "error while generating proxy response");
                OutboundEvent::gateway_timeout()
            }
        }
    }
}
