//! SOAP over HTTP

use super::execution_error;
use flowbridge_core::domain::adapter::SoapAdapterConfig;
use flowbridge_core::xml::soap;
use flowbridge_core::{AdapterDescriptor, CoreError, CorrelationContext, Direction, Payload, PayloadKind};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

const PROTOCOL: &str = "SOAP";

/// Post a message to the configured endpoint and return the response body element
pub async fn send(
    client: &Client,
    adapter: &AdapterDescriptor,
    config: &SoapAdapterConfig,
    payload: &Payload,
    ctx: &CorrelationContext,
) -> Result<Payload, CoreError> {
    call(client, adapter, config, &payload.to_text_lossy(), ctx).await
}

/// Poll the service with the configured `requestPayload`
pub async fn fetch(
    client: &Client,
    adapter: &AdapterDescriptor,
    config: &SoapAdapterConfig,
    ctx: &CorrelationContext,
) -> Result<Payload, CoreError> {
    let request = config
        .request_payload
        .as_deref()
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| {
            CoreError::ConfigurationError(format!(
                "SOAP adapter '{}' needs a requestPayload to be polled",
                adapter.name
            ))
        })?;
    call(client, adapter, config, request, ctx).await
}

async fn call(
    client: &Client,
    adapter: &AdapterDescriptor,
    config: &SoapAdapterConfig,
    message: &str,
    ctx: &CorrelationContext,
) -> Result<Payload, CoreError> {
    let endpoint = config.resolve_endpoint()?;
    let envelope = if soap::is_envelope(message) {
        message.to_string()
    } else {
        soap::wrap(message)
    };
    let request = Payload::text(envelope);
    ctx.capture_payload(adapter, PayloadKind::Request, Direction::Outbound, &request);

    let mut builder = client
        .post(endpoint)
        .header(CONTENT_TYPE, config.content_type())
        .body(request.into_bytes());
    if let Some(action) = config.soap_action.as_deref().filter(|a| !a.is_empty()) {
        builder = builder.header("SOAPAction", action);
    }
    if let Some(seconds) = config.timeout_seconds {
        builder = builder.timeout(Duration::from_secs(seconds));
    }

    let response = builder
        .send()
        .await
        .map_err(|e| execution_error(endpoint, PROTOCOL, e))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| execution_error(endpoint, PROTOCOL, e))?;
    ctx.capture_payload(adapter, PayloadKind::Response, Direction::Inbound, &Payload::text(body.clone()));
    debug!(endpoint, %status, bytes = body.len(), "SOAP response received");

    if !status.is_success() {
        let detail = soap::unwrap(&body).unwrap_or(body);
        return Err(execution_error(endpoint, PROTOCOL, format!("HTTP {}: {}", status, detail)));
    }
    if body.trim().is_empty() {
        return Ok(Payload::text(String::new()));
    }
    soap::unwrap(&body)
        .map(Payload::Text)
        .map_err(|e| execution_error(endpoint, PROTOCOL, e))
}
