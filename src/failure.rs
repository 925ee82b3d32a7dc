//! Structured per-request failures.
//!
//! Stages and handlers return [`Outcome`]. A [`Failure`] travels back up
//! the chain unchanged and is rendered once, at the pipeline boundary, as a
//! JSON body with a stable shape:
//!
//! ```text
//! { "message": "...", "traceID": "..." }                  // 4xx / 500
//! { "message": "...", "traceID": "...", "problems": {..} } // 422
//! ```

use std::collections::BTreeMap;

use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::capture::ResponseCapture;
use crate::response::write_json;

/// Field name → problem description, as reported by
/// [`Validate`](crate::Validate).
pub type Problems = BTreeMap<String, String>;

/// What every stage and handler returns.
pub type Outcome = Result<(), Failure>;

/// Message used for 500 responses whose real cause stays server-side.
pub const INTERNAL_SERVER_ERROR: &str = "Internal Server Error";

#[derive(Clone, Debug, Error, PartialEq)]
pub enum Failure {
    /// The request was refused: bad credentials, unreadable body, ...
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },

    /// The payload decoded but failed semantic validation.
    #[error("validation failed: {} problem(s)", .0.len())]
    Invalid(Problems),

    /// Something broke while serving the request.
    #[error("{0}")]
    Internal(String),
}

impl Failure {
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Rejected { status: StatusCode::FORBIDDEN, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::Rejected { status: StatusCode::BAD_REQUEST, message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Rejected { status, .. } => *status,
            Self::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Replace whatever was captured so far with this failure's JSON body.
    pub fn render(&self, w: &mut ResponseCapture, trace_id: &str) {
        w.reset();
        match self {
            Self::Rejected { message, .. } | Self::Internal(message) => {
                let body = FailureBody { message, trace_id, problems: None };
                write_json(w, trace_id, self.status(), &body, None);
            }
            Self::Invalid(problems) => {
                let body = FailureBody {
                    message: "validation failed",
                    trace_id,
                    problems: Some(problems),
                };
                write_json(w, trace_id, self.status(), &body, None);
            }
        }
    }
}

#[derive(Serialize)]
struct FailureBody<'a> {
    message: &'a str,
    #[serde(rename = "traceID")]
    trace_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    problems: Option<&'a Problems>,
}
