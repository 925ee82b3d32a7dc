//! In-memory response recorder.
//!
//! There is no socket in the target-group invocation model. Handlers write
//! into a [`ResponseCapture`] exactly as they would write into a connection,
//! and the adapter turns the recorded status, headers and body into the
//! outbound event once the chain has returned.

use std::io;

use bytes::{Bytes, BytesMut};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;

/// Records the status, headers and body a handler writes.
///
/// Single writer, owned by the one request being served. Status defaults to
/// `200 OK` until set; every field follows last-write-wins.
#[derive(Debug, Default)]
pub struct ResponseCapture {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl ResponseCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded status, or `200 OK` if none was written.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    /// Whether a status has been explicitly written.
    pub fn is_committed(&self) -> bool {
        self.status.is_some()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn write_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// Append bytes to the body.
    pub fn write_body(&mut self, chunk: &[u8]) {
        self.body.extend_from_slice(chunk);
    }

    /// Inserts `name` only if no value is present yet.
    pub fn set_default_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.entry(name).or_insert(value);
    }

    /// Discard everything written so far.
    pub fn reset(&mut self) {
        self.status = None;
        self.headers.clear();
        self.body.clear();
    }

    /// Freeze the recording into an internal response value.
    pub fn into_response(self) -> http::Response<Bytes> {
        let mut response = http::Response::new(self.body.freeze());
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.headers;
        response
    }
}

/// Lets serializers stream straight into the body.
impl io::Write for ResponseCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_body(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
