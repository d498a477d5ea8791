//! Protocol clients behind the [`AdapterGateway`] port

pub mod file;
pub mod http;
pub mod soap;

use async_trait::async_trait;
use flowbridge_core::{
    AdapterConfig, AdapterDescriptor, AdapterGateway, CoreError, CorrelationContext, Payload,
};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Default bound on a single adapter call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Gateway dispatching on the adapter's protocol
#[derive(Debug, Clone)]
pub struct ProtocolAdapterGateway {
    client: Client,
}

impl ProtocolAdapterGateway {
    /// Create a gateway whose HTTP calls are bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self, CoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(|e| CoreError::ConfigurationError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Gateway sharing an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn unsupported(adapter: &AdapterDescriptor) -> CoreError {
    CoreError::UnsupportedOperation(format!(
        "{} adapter '{}' is not implemented",
        adapter.adapter_type, adapter.name
    ))
}

/// Wrap a transport or protocol failure
pub(crate) fn execution_error(endpoint: &str, protocol: &str, cause: impl ToString) -> CoreError {
    CoreError::AdapterExecutionError {
        endpoint: endpoint.to_string(),
        protocol: protocol.to_string(),
        cause: cause.to_string(),
    }
}

#[async_trait]
impl AdapterGateway for ProtocolAdapterGateway {
    async fn fetch(&self, adapter: &AdapterDescriptor, ctx: &CorrelationContext) -> Result<Payload, CoreError> {
        debug!(adapter = %adapter.name, protocol = %adapter.adapter_type, correlation_id = %ctx.id(), "Fetching");
        let result = match adapter.typed_config()? {
            AdapterConfig::Soap(config) => soap::fetch(&self.client, adapter, &config, ctx).await,
            AdapterConfig::Http(config) => http::fetch(&self.client, adapter, &config, ctx).await,
            AdapterConfig::File(config) => file::fetch(adapter, &config, ctx).await,
            AdapterConfig::Ftp(_) => Err(unsupported(adapter)),
        };
        if let Err(err) = &result {
            warn!(adapter = %adapter.name, ?err, "Adapter fetch failed");
        }
        result
    }

    async fn send(
        &self,
        adapter: &AdapterDescriptor,
        payload: &Payload,
        ctx: &CorrelationContext,
    ) -> Result<Payload, CoreError> {
        debug!(
            adapter = %adapter.name,
            protocol = %adapter.adapter_type,
            correlation_id = %ctx.id(),
            bytes = payload.len(),
            "Sending"
        );
        let result = match adapter.typed_config()? {
            AdapterConfig::Soap(config) => soap::send(&self.client, adapter, &config, payload, ctx).await,
            AdapterConfig::Http(config) => http::send(&self.client, adapter, &config, payload, ctx).await,
            AdapterConfig::File(config) => file::send(adapter, &config, payload, ctx).await,
            AdapterConfig::Ftp(_) => Err(unsupported(adapter)),
        };
        if let Err(err) = &result {
            warn!(adapter = %adapter.name, ?err, "Adapter send failed");
        }
        result
    }
}
