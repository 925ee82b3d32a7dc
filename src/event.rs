//! Target-group proxy event wire types.
//!
//! The load balancer delivers each HTTP request to the function as one JSON
//! document and expects one JSON document back. Field names follow the
//! wire format (camelCase); maps the balancer sends as `null` read as empty.
//!
//! ```json
//! {
//!   "requestContext": { "elb": { "targetGroupArn": "arn:aws:elasticloadbalancing:..." } },
//!   "httpMethod": "GET",
//!   "path": "/users/42",
//!   "queryStringParameters": { "verbose": "1" },
//!   "headers": { "x-amzn-trace-id": "Root=1-5bdb40ca-556d8b0c50dc66f0511bf520" },
//!   "isBase64Encoded": false,
//!   "body": ""
//! }
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

/// An HTTP request as delivered by the load balancer.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    #[serde(default, deserialize_with = "nullable")]
    pub request_context: TargetGroupContext,
    #[serde(default, deserialize_with = "nullable")]
    pub http_method: String,
    #[serde(default, deserialize_with = "nullable")]
    pub path: String,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "HashMap::is_empty")]
    pub query_string_parameters: HashMap<String, String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "HashMap::is_empty")]
    pub multi_value_query_string_parameters: HashMap<String, Vec<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "HashMap::is_empty")]
    pub multi_value_headers: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub is_base64_encoded: bool,
    #[serde(default)]
    pub body: Option<String>,
}

impl InboundEvent {
    /// The balancer sends multi-value maps only when the target group has
    /// multi-value headers enabled, and then expects them back.
    pub fn uses_multi_value_headers(&self) -> bool {
        !self.multi_value_headers.is_empty()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct TargetGroupContext {
    #[serde(default, deserialize_with = "nullable")]
    pub elb: ElbContext,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElbContext {
    #[serde(default, deserialize_with = "nullable")]
    pub target_group_arn: String,
}

/// The response document returned to the load balancer.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEvent {
    pub status_code: u16,
    #[serde(default)]
    pub status_description: String,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "HashMap::is_empty")]
    pub multi_value_headers: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub is_base64_encoded: bool,
}

impl OutboundEvent {
    /// The fixed reply used when the adapter cannot trust its own
    /// translation of an event: `504`, no headers, empty body.
    pub fn gateway_timeout() -> Self {
        Self {
            status_code: 504,
            status_description: "504 Gateway Timeout".to_owned(),
            ..Self::default()
        }
    }
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
