//! Translation between proxy events and requests/responses.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode, Uri};

use crate::error::{Error, Result};
use crate::event::{InboundEvent, OutboundEvent};
use crate::request::Request;

/// Converts between the host's event shapes and internal values.
pub trait EventCodec: Send + Sync {
    fn decode(&self, event: &InboundEvent) -> Result<Request>;

    /// `multi_value_headers` mirrors the shape of the inbound event.
    fn encode(&self, response: http::Response<Bytes>, multi_value_headers: bool) -> Result<OutboundEvent>;
}

/// Codec for application load balancer target-group events.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlbCodec;

impl AlbCodec {
    /// Reads an outbound event back into a response.
    pub fn decode_response(&self, event: &OutboundEvent) -> Result<http::Response<Bytes>> {
        let status = StatusCode::from_u16(event.status_code)
            .map_err(|_| Error::decode(format!("invalid status code {}", event.status_code)))?;
        let headers = header_map(&event.headers, &event.multi_value_headers)?;
        let body = body_bytes(&event.body, event.is_base64_encoded)?;

        let mut response = http::Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

impl EventCodec for AlbCodec {
    fn decode(&self, event: &InboundEvent) -> Result<Request> {
        let method = Method::from_bytes(event.http_method.as_bytes())
            .map_err(|_| Error::decode(format!("invalid http method {:?}", event.http_method)))?;

        if !event.path.starts_with('/') {
            return Err(Error::decode(format!("invalid path {:?}", event.path)));
        }

        let query = query_string(event);
        let uri = if query.is_empty() { event.path.clone() } else { format!("{}?{query}", event.path) };
        let uri: Uri = uri.parse().map_err(|e| Error::decode(format!("invalid uri: {e}")))?;

        let headers = header_map(&event.headers, &event.multi_value_headers)?;
        let body = body_bytes(event.body.as_deref().unwrap_or_default(), event.is_base64_encoded)?;

        Ok(Request::new(method, uri, headers, body))
    }

    fn encode(&self, response: http::Response<Bytes>, multi_value_headers: bool) -> Result<OutboundEvent> {
        let (parts, body) = response.into_parts();

        let mut event = OutboundEvent {
            status_code: parts.status.as_u16(),
            status_description: status_description(parts.status),
            ..OutboundEvent::default()
        };

        for name in parts.headers.keys() {
            let values = parts.headers.get_all(name)
                .iter()
                .map(|v| v.to_str().map(str::to_owned))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|_| Error::encode(format!("header {name} is not visible ascii")))?;

            if multi_value_headers {
                event.multi_value_headers.insert(name.to_string(), values);
            } else {
                event.headers.insert(name.to_string(), values.join(","));
            }
        }

        match std::str::from_utf8(&body) {
            Ok(text) if is_textual(&parts.headers) => event.body = text.to_owned(),
            _ if body.is_empty() => {}
            _ => {
                event.body = STANDARD.encode(&body);
                event.is_base64_encoded = true;
            }
        }

        Ok(event)
    }
}

fn status_description(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {reason}", status.as_u16()),
        None => status.as_u16().to_string(),
    }
}

/// Multi-value parameters win over single-value ones; keys are sorted so
/// the same event always yields the same URI.
fn query_string(event: &InboundEvent) -> String {
    let mut pairs: Vec<(&str, &str)> = if event.multi_value_query_string_parameters.is_empty() {
        event.query_string_parameters.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
    } else {
        event.multi_value_query_string_parameters.iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| (k.as_str(), v.as_str())))
            .collect()
    };
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    pairs.iter()
        .map(|(k, v)| if v.is_empty() { (*k).to_owned() } else { format!("{k}={v}") })
        .collect::<Vec<_>>()
        .join("&")
}

fn header_map(
    single: &std::collections::HashMap<String, String>,
    multi: &std::collections::HashMap<String, Vec<String>>,
) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let mut append = |name: &str, value: &str| -> Result<()> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::decode(format!("invalid header name {name:?}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| Error::decode(format!("invalid value for header {name}")))?;
        headers.append(name, value);
        Ok(())
    };

    if multi.is_empty() {
        for (name, value) in single {
            append(name, value)?;
        }
    } else {
        for (name, values) in multi {
            for value in values {
                append(name, value)?;
            }
        }
    }
    Ok(headers)
}

fn body_bytes(body: &str, base64: bool) -> Result<Bytes> {
    if base64 {
        Ok(Bytes::from(STANDARD.decode(body)?))
    } else {
        Ok(Bytes::copy_from_slice(body.as_bytes()))
    }
}

fn is_textual(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let mime = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    mime.starts_with("text/")
        || mime.ends_with("json")
        || mime.ends_with("xml")
        || mime == "application/javascript"
        || mime == "application/x-www-form-urlencoded"
}
