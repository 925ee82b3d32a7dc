//! JSON responses and the [`Respond`] conversion trait.
//!
//! Leaf handlers return a [`Json`] (or anything else implementing
//! [`Respond`]); the pipeline writes it into the request's
//! [`ResponseCapture`] through [`write_json`], so success and failure bodies
//! share one wire format.

use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use serde::Serialize;
use tracing::error;

use crate::capture::ResponseCapture;

/// Outbound header carrying the request's trace identifier.
pub const TRACE_ID_HEADER: HeaderName = HeaderName::from_static("app-trace-id");

// ── JSON responder ────────────────────────────────────────────────────────────

/// Writes `payload` as a JSON response.
///
/// Copies `extra` headers, sets `content-type`, stamps [`TRACE_ID_HEADER`],
/// commits `status`, then streams the encoded payload into the body.
///
/// The status is committed before encoding starts, so an encoding failure
/// can only be logged; the body may hold a partial document.
pub fn write_json<T: Serialize + ?Sized>(
    w: &mut ResponseCapture,
    trace_id: &str,
    status: StatusCode,
    payload: &T,
    extra: Option<&HeaderMap>,
) {
    if let Some(extra) = extra {
        for name in extra.keys() {
            let headers = w.headers_mut();
            headers.remove(name);
            for value in extra.get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }
    }

    w.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    stamp_trace_id(w, trace_id);
    w.write_status(status);

    if let Err(e) = serde_json::to_writer(&mut *w, payload) {
        error!(error = %e, %status, trace_id, "encode error");
    }
}

/// Sets [`TRACE_ID_HEADER`]; an id that is not a valid header value is sent
/// as an empty string.
pub(crate) fn stamp_trace_id(w: &mut ResponseCapture, trace_id: &str) {
    let value = HeaderValue::from_str(trace_id).unwrap_or(HeaderValue::from_static(""));
    w.headers_mut().insert(TRACE_ID_HEADER, value);
}

// ── Json ──────────────────────────────────────────────────────────────────────

/// A JSON reply with a status and optional extra headers.
///
/// ```rust
/// use albgate::Json;
/// use http::StatusCode;
///
/// Json::new(StatusCode::CREATED, serde_json::json!({ "id": 42 }))
///     .header("location", "/users/42");
/// ```
pub struct Json<T> {
    status: StatusCode,
    value: T,
    headers: HeaderMap,
}

impl<T> Json<T> {
    /// `200 OK`.
    pub fn ok(value: T) -> Self {
        Self::new(StatusCode::OK, value)
    }

    pub fn new(status: StatusCode, value: T) -> Self {
        Self { status, value, headers: HeaderMap::new() }
    }

    /// Adds an extra header. Invalid names or values are skipped with an
    /// error log rather than failing the reply.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => error!(name, "dropping invalid response header"),
        }
        self
    }
}

// ── Respond ───────────────────────────────────────────────────────────────────

/// Conversion of a handler's success value into written output.
///
/// Implement on your own types to return them directly from handlers.
pub trait Respond {
    fn respond(self, w: &mut ResponseCapture, trace_id: &str);
}

impl<T: Serialize> Respond for Json<T> {
    fn respond(self, w: &mut ResponseCapture, trace_id: &str) {
        write_json(w, trace_id, self.status, &self.value, Some(&self.headers));
    }
}

/// Status with no body, e.g. `Ok(StatusCode::NO_CONTENT)`.
impl Respond for StatusCode {
    fn respond(self, w: &mut ResponseCapture, trace_id: &str) {
        stamp_trace_id(w, trace_id);
        w.write_status(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn json_reply_sets_headers_status_and_body() {
        let mut w = ResponseCapture::new();
        Json::new(StatusCode::CREATED, serde_json::json!({ "a": 1 }))
            .header("x-foo", "bar")
            .respond(&mut w, "Root=1-abc");

        assert_eq!(w.status(), StatusCode::CREATED);
        assert_eq!(w.headers()["content-type"], "application/json");
        assert_eq!(w.headers()["x-foo"], "bar");
        assert_eq!(w.headers()[TRACE_ID_HEADER], "Root=1-abc");
        assert_eq!(w.body(), br#"{"a":1}"#);
    }

    #[test]
    fn repeated_extra_headers_keep_every_value() {
        let mut w = ResponseCapture::new();
        w.headers_mut().insert("set-cookie", HeaderValue::from_static("stale=1"));
        Json::ok("x")
            .header("set-cookie", "a=1")
            .header("set-cookie", "b=2")
            .respond(&mut w, "");

        let cookies: Vec<_> = w.headers().get_all("set-cookie").iter().collect();
        assert_eq!(cookies, ["a=1", "b=2"]);
    }

    #[test]
    fn encoding_failure_keeps_committed_status() {
        // Non-string map keys cannot be encoded as JSON.
        let mut payload = HashMap::new();
        payload.insert((1, 2), "x");

        let mut w = ResponseCapture::new();
        write_json(&mut w, "t", StatusCode::IM_A_TEAPOT, &payload, None);

        assert_eq!(w.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(w.headers()[TRACE_ID_HEADER], "t");
    }

    #[test]
    fn invalid_header_is_skipped() {
        let mut w = ResponseCapture::new();
        Json::ok("x").header("bad header", "v").respond(&mut w, "");
        assert_eq!(w.headers().len(), 2);
    }

    #[test]
    fn status_reply_has_no_body() {
        let mut w = ResponseCapture::new();
        StatusCode::NO_CONTENT.respond(&mut w, "");
        assert_eq!(w.status(), StatusCode::NO_CONTENT);
        assert!(w.body().is_empty());
        assert_eq!(w.headers()[TRACE_ID_HEADER], "");
    }
}
