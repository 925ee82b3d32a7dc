//! Semantic validation of decoded request bodies.

use crate::context::RequestContext;
use crate::failure::Problems;

/// A value that can check itself after decoding.
///
/// `ctx` is the request's context, so rules can depend on the caller's
/// claims or the remaining deadline. An empty map means the value is valid.
/// Used by
/// [`Request::json_valid`](crate::Request::json_valid), which turns any
/// reported problem into a 422 response before the handler's business logic
/// runs.
///
/// ```rust
/// use albgate::{Problems, RequestContext, Validate};
///
/// #[derive(serde::Deserialize)]
/// struct NewUser { name: String, admin: bool }
///
/// impl Validate for NewUser {
///     fn validate(&self, ctx: &RequestContext) -> Problems {
///         let mut problems = Problems::new();
///         if self.name.trim().is_empty() {
///             problems.insert("name".into(), "must not be empty".into());
///         }
///         if self.admin && ctx.role() != Some("admin") {
///             problems.insert("admin".into(), "requires the admin role".into());
///         }
///         problems
///     }
/// }
/// ```
pub trait Validate {
    fn validate(&self, ctx: &RequestContext) -> Problems;
}
