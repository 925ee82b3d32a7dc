//! Header-based authentication stages.
//!
//! Both stages reject with a 403 and never run the inner chain on failure.
//! Neither verifies a signature: the load balancer authenticates the user
//! and signs `X-Amzn-Oidc-Data` before the request reaches this process.

use base64::Engine as _;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use tracing::{error, warn};

use crate::capture::ResponseCapture;
use crate::context::Claims;
use crate::error::{Error, Result};
use crate::failure::Failure;
use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::{AMZN_TRACE_ID_HEADER, Request};

/// Header holding the load balancer's signed OIDC claims token.
pub const OIDC_DATA_HEADER: &str = "x-amzn-oidc-data";

/// Header checked by [`ApiKey`].
pub const API_KEY_HEADER: &str = "x-api-key";

/// Role claim read when none is configured.
pub const DEFAULT_ROLE_CLAIM: &str = "custom:role";

const PADDING_INDIFFERENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const URL_SAFE: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, PADDING_INDIFFERENT);
const STANDARD: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, PADDING_INDIFFERENT);

/// Decodes the claims segment of a `header.payload.signature` token.
///
/// The payload may use either base64 alphabet, with or without padding.
/// `role_claim` names the claim copied into [`Claims::role`].
pub fn decode_claims(token: &str, role_claim: &str) -> Result<Claims> {
    let parts: Vec<&str> = token.split('.').collect();
    let [_, payload, _] = parts.as_slice() else {
        return Err(Error::decode(format!("token has {} parts, expected 3", parts.len())));
    };

    let raw = URL_SAFE.decode(payload).or_else(|_| STANDARD.decode(payload))?;
    let mut claims: Claims = serde_json::from_slice(&raw)?;
    claims.resolve_role(role_claim);
    Ok(claims)
}

// ── AlbAuth ───────────────────────────────────────────────────────────────────

/// Decodes `X-Amzn-Oidc-Data` into [`Claims`] and attaches them, together
/// with the trace id, to the request context.
pub struct AlbAuth {
    role_claim: String,
}

impl AlbAuth {
    pub fn new() -> Self {
        Self { role_claim: DEFAULT_ROLE_CLAIM.to_owned() }
    }

    /// Reads the role from `claim` instead of [`DEFAULT_ROLE_CLAIM`].
    pub fn role_claim(mut self, claim: impl Into<String>) -> Self {
        self.role_claim = claim.into();
        self
    }
}

impl Default for AlbAuth {
    fn default() -> Self { Self::new() }
}

impl Middleware for AlbAuth {
    fn name(&self) -> &'static str {
        "alb-auth"
    }

    fn process<'a>(&'a self, w: &'a mut ResponseCapture, mut req: Request, next: Next<'a>) -> BoxFuture<'a> {
        Box::pin(async move {
            let token = req.header(OIDC_DATA_HEADER).unwrap_or_default();
            let claims = match decode_claims(token, &self.role_claim) {
                Ok(claims) => claims,
                Err(e) => {
                    error!(error = %e, path = req.path(), trace_id = req.context().trace_id(), "error decoding oidc data");
                    return Err(Failure::forbidden("invalid token"));
                }
            };

            let trace_id = req.header(AMZN_TRACE_ID_HEADER).unwrap_or_default().to_owned();
            let ctx = req.context_mut();
            ctx.set_trace_id(trace_id);
            if let Err(e) = ctx.attach_claims(claims) {
                return Err(Failure::internal(e.to_string()));
            }

            next.run(w, req).await
        })
    }
}

// ── ApiKey ────────────────────────────────────────────────────────────────────

/// Requires `X-API-KEY` to equal a configured key exactly.
pub struct ApiKey {
    key: String,
}

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Middleware for ApiKey {
    fn name(&self) -> &'static str {
        "api-key"
    }

    fn process<'a>(&'a self, w: &'a mut ResponseCapture, req: Request, next: Next<'a>) -> BoxFuture<'a> {
        Box::pin(async move {
            if req.header(API_KEY_HEADER) != Some(self.key.as_str()) {
                warn!(path = req.path(), trace_id = req.context().trace_id(), "invalid api-key");
                return Err(Failure::forbidden("invalid api-key"));
            }
            next.run(w, req).await
        })
    }
}
