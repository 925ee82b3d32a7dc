//! Incoming request type.

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use serde::de::DeserializeOwned;

use crate::context::RequestContext;
use crate::failure::Failure;
use crate::validate::Validate;

/// Inbound header carrying the load balancer's trace identifier.
pub const AMZN_TRACE_ID_HEADER: &str = "x-amzn-trace-id";

/// An incoming request, decoded from one proxy event.
///
/// Owns its [`RequestContext`]; the trace id is attached on construction so
/// every stage and handler can rely on it being present (possibly empty).
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    context: RequestContext,
}

impl Request {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        let trace_id = header_str(&headers, AMZN_TRACE_ID_HEADER).unwrap_or_default().to_owned();
        Self { method, uri, headers, body, context: RequestContext::new(trace_id) }
    }

    pub fn from_http(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::new(parts.method, parts.uri, parts.headers, body)
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup. Values that are not visible ASCII
    /// read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        header_str(&self.headers, name)
    }

    /// First value of a query-string parameter, without percent-decoding.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.uri.query()?
            .split('&')
            .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    pub fn context(&self) -> &RequestContext { &self.context }
    pub fn context_mut(&mut self) -> &mut RequestContext { &mut self.context }

    /// Decodes the body as JSON.
    ///
    /// An unreadable body is a 400 failure; the decoder's message stays in
    /// the server log.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Failure> {
        serde_json::from_slice(&self.body).map_err(|e| {
            tracing::debug!(error = %e, trace_id = self.context.trace_id(), "decode json body");
            Failure::bad_request("invalid request body")
        })
    }

    /// Decodes the body as JSON and validates it. Any reported problem
    /// yields [`Failure::Invalid`].
    pub fn json_valid<T: DeserializeOwned + Validate>(&self) -> Result<T, Failure> {
        let value: T = self.json()?;
        let problems = value.validate(&self.context);
        if problems.is_empty() {
            Ok(value)
        } else {
            Err(Failure::Invalid(problems))
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
