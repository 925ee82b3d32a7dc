//! Function-host glue.
//!
//! Registers a [`ProxyAdapter`] with the Lambda runtime. Payloads are taken
//! as raw JSON so a malformed event still gets the gateway-timeout reply
//! instead of a runtime deserialization error.

use lambda_runtime::{LambdaEvent, service_fn};
use serde_json::Value;
use tracing::info;

use crate::adapter::ProxyAdapter;
use crate::codec::EventCodec;

/// Polls the runtime API for invocations until the host shuts the process
/// down. Only a runtime failure ends this early.
pub async fn run<C: EventCodec>(adapter: ProxyAdapter<C>) -> Result<(), lambda_runtime::Error> {
    info!("albgate waiting for invocations");

    let adapter = &adapter;
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        Ok::<_, lambda_runtime::Error>(adapter.handle_value(event.payload).await)
    }))
    .await
}
