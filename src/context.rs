//! Request-scoped context.
//!
//! Every [`Request`](crate::Request) owns one [`RequestContext`] for the
//! lifetime of a single invocation. It holds a fixed set of typed fields,
//! one per concern, each read through its own getter:
//!
//! | Field | Set by | Absent |
//! |---|---|---|
//! | trace id | request construction, [`AlbAuth`](crate::middleware::AlbAuth) | empty string |
//! | email, name, phone, role | [`AlbAuth`](crate::middleware::AlbAuth) | `None` |
//! | deadline | [`TimeoutGuard`](crate::middleware::TimeoutGuard) | `None` |
//!
//! Identity fields are write-once: after claims are attached they cannot be
//! replaced for the rest of the invocation.

use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

// ── Claims ────────────────────────────────────────────────────────────────────

/// Identity attributes decoded from the `X-Amzn-Oidc-Data` token.
///
/// Every field is optional; a token without a given claim is not an error.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: Option<String>,
    pub phone_number: Option<String>,
    pub iss: Option<String>,
    pub exp: Option<i64>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,

    /// Resolved from the configured role claim, see [`Claims::resolve_role`].
    #[serde(skip)]
    pub role: Option<String>,

    /// Claims without a dedicated field, keyed by claim name.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Claims {
    /// Moves the string claim named `claim` into [`Claims::role`].
    pub(crate) fn resolve_role(&mut self, claim: &str) {
        self.role = match self.extra.remove(claim) {
            Some(Value::String(role)) => Some(role),
            _ => None,
        };
    }
}

// ── Deadline ──────────────────────────────────────────────────────────────────

/// A cooperative, cancellable deadline attached by
/// [`TimeoutGuard`](crate::middleware::TimeoutGuard).
///
/// Nothing aborts a handler when the deadline passes. Handlers that care
/// poll [`is_cancelled`](Deadline::is_cancelled) or race their work against
/// [`cancelled`](Deadline::cancelled).
#[derive(Clone, Debug)]
pub struct Deadline {
    token: CancellationToken,
    expires_at: Instant,
}

impl Deadline {
    pub(crate) fn new(expires_at: Instant) -> Self {
        Self { token: CancellationToken::new(), expires_at }
    }

    /// A nested deadline never outlives its parent.
    pub(crate) fn child(&self, expires_at: Instant) -> Self {
        Self {
            token: self.token.child_token(),
            expires_at: expires_at.min(self.expires_at),
        }
    }

    /// Cancels this deadline (and its children) when the guard is dropped.
    pub(crate) fn release_guard(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// True once the deadline has passed or the owning guard released it.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || Instant::now() >= self.expires_at
    }

    /// Resolves when [`is_cancelled`](Deadline::is_cancelled) becomes true.
    pub async fn cancelled(&self) {
        tokio::select! {
            () = self.token.cancelled() => {}
            () = tokio::time::sleep_until(self.expires_at) => {}
        }
    }
}

// ── RequestContext ────────────────────────────────────────────────────────────

/// Returned when identity claims are attached twice to one request.
#[derive(Debug, PartialEq, Eq)]
pub struct ClaimsAlreadyAttached;

impl fmt::Display for ClaimsAlreadyAttached {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("identity claims already attached to this request")
    }
}

impl std::error::Error for ClaimsAlreadyAttached {}

/// Per-invocation values shared between stages and the terminal handler.
#[derive(Debug)]
pub struct RequestContext {
    trace_id: String,
    received_at: Instant,
    claims: OnceLock<Claims>,
    email: OnceLock<String>,
    name: OnceLock<String>,
    phone: OnceLock<String>,
    role: OnceLock<String>,
    deadline: Option<Deadline>,
}

impl RequestContext {
    pub(crate) fn new(trace_id: String) -> Self {
        Self {
            trace_id,
            received_at: Instant::now(),
            claims: OnceLock::new(),
            email: OnceLock::new(),
            name: OnceLock::new(),
            phone: OnceLock::new(),
            role: OnceLock::new(),
            deadline: None,
        }
    }

    /// Correlation id threaded from `X-Amzn-Trace-Id` to `App-Trace-ID`.
    /// Empty when the request carried none.
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn set_trace_id(&mut self, trace_id: impl Into<String>) {
        self.trace_id = trace_id.into();
    }

    /// When the request was built; deadlines are measured from here.
    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    pub fn claims(&self) -> Option<&Claims> {
        self.claims.get()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.get().map(String::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.get().map(String::as_str)
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.get().map(String::as_str)
    }

    pub fn role(&self) -> Option<&str> {
        self.role.get().map(String::as_str)
    }

    /// Attach decoded claims. Fails if claims were already attached.
    pub fn attach_claims(&mut self, claims: Claims) -> Result<(), ClaimsAlreadyAttached> {
        if self.claims.get().is_some() {
            return Err(ClaimsAlreadyAttached);
        }

        let fields = [
            (&self.email, &claims.email),
            (&self.name, &claims.name),
            (&self.phone, &claims.phone_number),
            (&self.role, &claims.role),
        ];
        for (slot, value) in fields {
            if let Some(value) = value {
                let _ = slot.set(value.clone());
            }
        }

        self.claims.set(claims).map_err(|_| ClaimsAlreadyAttached)
    }

    pub fn deadline(&self) -> Option<&Deadline> {
        self.deadline.as_ref()
    }

    pub(crate) fn set_deadline(&mut self, deadline: Deadline) {
        self.deadline = Some(deadline);
    }
}
