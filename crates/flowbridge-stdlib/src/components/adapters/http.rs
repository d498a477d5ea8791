//! Plain HTTP and REST

use super::execution_error;
use flowbridge_core::domain::adapter::HttpAdapterConfig;
use flowbridge_core::{AdapterDescriptor, CoreError, CorrelationContext, Direction, Payload, PayloadKind};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder};
use std::time::Duration;
use tracing::debug;

fn method(name: &str) -> Result<Method, CoreError> {
    Method::from_bytes(name.trim().to_uppercase().as_bytes())
        .map_err(|_| CoreError::ConfigurationError(format!("Invalid HTTP method: {}", name)))
}

fn request(client: &Client, config: &HttpAdapterConfig, method: Method) -> Result<RequestBuilder, CoreError> {
    let mut builder = client
        .request(method, config.endpoint()?)
        .header(CONTENT_TYPE, config.content_type());
    for (name, value) in &config.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(seconds) = config.timeout_seconds {
        builder = builder.timeout(Duration::from_secs(seconds));
    }
    Ok(builder)
}

/// Send the payload as-is with the configured method and return the raw response
pub async fn send(
    client: &Client,
    adapter: &AdapterDescriptor,
    config: &HttpAdapterConfig,
    payload: &Payload,
    ctx: &CorrelationContext,
) -> Result<Payload, CoreError> {
    let method = method(config.method())?;
    ctx.capture_payload(adapter, PayloadKind::Request, Direction::Outbound, payload);
    let mut builder = request(client, config, method.clone())?;
    if method != Method::GET && method != Method::HEAD {
        builder = builder.body(payload.as_bytes().to_vec());
    }
    execute(builder, adapter, config, ctx).await
}

/// Poll the endpoint with the configured poll method
pub async fn fetch(
    client: &Client,
    adapter: &AdapterDescriptor,
    config: &HttpAdapterConfig,
    ctx: &CorrelationContext,
) -> Result<Payload, CoreError> {
    let builder = request(client, config, method(config.poll_method())?)?;
    execute(builder, adapter, config, ctx).await
}

async fn execute(
    builder: RequestBuilder,
    adapter: &AdapterDescriptor,
    config: &HttpAdapterConfig,
    ctx: &CorrelationContext,
) -> Result<Payload, CoreError> {
    let endpoint = config.endpoint()?;
    let protocol = adapter.adapter_type.as_str();
    let response = builder
        .send()
        .await
        .map_err(|e| execution_error(endpoint, protocol, e))?;
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| execution_error(endpoint, protocol, e))?;
    let payload = Payload::from_bytes(bytes.to_vec());
    if !payload.is_empty() {
        ctx.capture_payload(adapter, PayloadKind::Response, Direction::Inbound, &payload);
    }
    debug!(endpoint, %status, bytes = payload.len(), "HTTP response received");

    if !status.is_success() {
        return Err(execution_error(
            endpoint,
            protocol,
            format!("HTTP {}: {}", status, payload.to_text_lossy()),
        ));
    }
    Ok(payload)
}
