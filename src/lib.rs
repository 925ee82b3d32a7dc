//! # albgate
//!
//! Run ordinary request/response handlers behind a load balancer target group
//! on a function-as-a-service host.
//!
//! ## The contract
//!
//! The load balancer authenticates users, terminates TLS and hands each
//! request to the function as one JSON event. albgate turns that event into a
//! [`Request`], runs it through a [`MiddlewareChain`](middleware::MiddlewareChain)
//! into a [`ResponseCapture`], and turns the capture back into the event the
//! load balancer expects.
//!
//! What the host and the load balancer already own, albgate ignores:
//!
//! - **Authentication**: the OIDC handshake happens upstream; albgate only
//!   reads the signed claims header it forwards
//! - **Routing**: one function per target group; dispatch inside the handler
//!   if you need it
//! - **Retries and scaling**: the host's job
//!
//! What's left for albgate:
//!
//! - Event translation with a 504 fallback when an event cannot be trusted
//! - Panic containment, request logging, deadlines, API keys and claims
//! - JSON replies stamped with the request's trace identifier
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use albgate::middleware::{AlbAuth, MiddlewareChain};
//! use albgate::{Config, Failure, Json, ProxyAdapter, Request};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let config = Config::from_env()?;
//!     albgate::logging::init(config.log_format);
//!
//!     let pipeline = MiddlewareChain::from_config(&config)
//!         .with(AlbAuth::new().role_claim(&config.role_claim))
//!         .handler(whoami);
//!
//!     albgate::lambda::run(ProxyAdapter::new(pipeline)).await?;
//!     Ok(())
//! }
//!
//! async fn whoami(req: Request) -> Result<Json<Option<String>>, Failure> {
//!     Ok(Json::ok(req.context().email().map(str::to_owned)))
//! }
//! ```

mod adapter;
mod capture;
mod codec;
mod config;
mod context;
mod error;
mod event;
mod failure;
mod handler;
mod request;
mod response;
mod server;
mod validate;

#[cfg(feature = "lambda")]
pub mod lambda;
pub mod logging;
pub mod middleware;

pub use adapter::ProxyAdapter;
pub use capture::ResponseCapture;
pub use codec::{AlbCodec, EventCodec};
pub use config::{Config, LogFormat};
pub use context::{Claims, ClaimsAlreadyAttached, Deadline, RequestContext};
pub use error::{Error, Result};
pub use event::{ElbContext, InboundEvent, OutboundEvent, TargetGroupContext};
pub use failure::{Failure, INTERNAL_SERVER_ERROR, Outcome, Problems};
pub use handler::{BoxFuture, Handler};
pub use request::{AMZN_TRACE_ID_HEADER, Request};
pub use response::{Json, Respond, TRACE_ID_HEADER, write_json};
pub use server::Server;
pub use validate::Validate;
