//! Unified error type.

use thiserror::Error;

/// Result type alias for albgate's fallible operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned by albgate's fallible operations.
///
/// Request-level failures (403, 422, 500, ...) are expressed as
/// [`Failure`](crate::Failure) values and rendered into the response. This
/// type surfaces infrastructure failures: translating a proxy event, reading
/// configuration, binding a local listener.
#[derive(Debug, Error)]
pub enum Error {
    /// The inbound event could not be turned into a request.
    #[error("decode event: {0}")]
    Decode(String),

    /// The captured response could not be turned into an outbound event.
    #[error("encode event: {0}")]
    Encode(String),

    /// A configuration value is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub(crate) fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }
}
