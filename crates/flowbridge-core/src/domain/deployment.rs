use crate::domain::adapter::{AdapterConfig, AdapterDescriptor, AdapterType, ConnectionMode};
use crate::domain::flow::{FlowId, FlowStatus, IntegrationFlow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Derived, non-authoritative hints attached to a deployed flow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentMetadata {
    /// Flow name at deploy time
    pub flow_name: String,
    /// Source adapter protocol
    pub adapter_type: String,
    /// Source adapter mode
    pub adapter_mode: String,
    /// SOAP: `<endpoint>?wsdl`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wsdl_url: Option<String>,
    /// SOAP: `1.1` or `1.2`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soap_version: Option<String>,
    /// REST: human readable docs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_docs_url: Option<String>,
    /// REST: OpenAPI document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_api_url: Option<String>,
    /// HTTP: accepted methods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_methods: Option<String>,
    /// HTTP: expected content type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// File based: whether the directory is polled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_enabled: Option<bool>,
    /// File based: files picked up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_pattern: Option<String>,
}

/// Public view of a deployed flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentInfo {
    /// Flow id
    pub flow_id: FlowId,
    /// Deployment status
    pub status: FlowStatus,
    /// Public endpoint
    pub endpoint: String,
    /// When the flow was deployed
    pub deployed_at: Option<DateTime<Utc>>,
    /// Who deployed it
    pub deployed_by: Option<String>,
    /// Derived hints
    pub metadata: DeploymentMetadata,
}

impl DeploymentInfo {
    /// Build the view for a deployed flow; `None` otherwise
    pub fn of(flow: &IntegrationFlow) -> Option<Self> {
        if !flow.is_deployed() {
            return None;
        }
        Some(Self {
            flow_id: flow.id.clone(),
            status: flow.status,
            endpoint: flow.deployment_endpoint.clone()?,
            deployed_at: flow.deployed_at,
            deployed_by: flow.deployed_by.clone(),
            metadata: flow.deployment_metadata.clone().unwrap_or_default(),
        })
    }
}

/// Where generated endpoints live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSettings {
    /// `http` or `https`
    pub protocol: String,
    /// Public host name
    pub host: String,
    /// Public port
    pub port: u16,
    /// Base directory of `file://` endpoints
    pub file_base_path: String,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 8080,
            file_base_path: "/opt/integrixflowbridge/flows".to_string(),
        }
    }
}

impl EndpointSettings {
    /// `<protocol>://<host>:<port>`
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

/// Lowercase the name and replace anything outside `[a-z0-9-]` with `-`
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

/// Compute the public endpoint of a flow from its source adapter
pub fn generate_endpoint(
    settings: &EndpointSettings,
    flow: &IntegrationFlow,
    source: &AdapterDescriptor,
    source_config: &AdapterConfig,
) -> String {
    let base = settings.base_url();

    if source_config.connection_mode() == Some(ConnectionMode::Push) {
        if let Some(path) = source_config
            .service_endpoint_url()
            .map(str::trim)
            .filter(|p| !p.is_empty())
        {
            let mut path = if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{}", path)
            };
            if source.adapter_type == AdapterType::Soap && !path.starts_with("/soap/") {
                path = format!("/soap{}", path);
            }
            return format!("{}{}", base, path);
        }
    }

    let slug = slugify(&flow.name);
    match source.adapter_type {
        AdapterType::Http | AdapterType::Rest => format!("{}/api/integration/{}", base, slug),
        AdapterType::Soap => format!("{}/soap/{}", base, slug),
        AdapterType::File | AdapterType::Ftp | AdapterType::Sftp => format!(
            "file://{}/{}",
            settings.file_base_path.trim_end_matches('/'),
            slug
        ),
    }
}

/// Build the deployment hints for a flow
pub fn build_metadata(
    flow: &IntegrationFlow,
    source: &AdapterDescriptor,
    source_config: &AdapterConfig,
    endpoint: &str,
) -> DeploymentMetadata {
    let mut metadata = DeploymentMetadata {
        flow_name: flow.name.clone(),
        adapter_type: source.adapter_type.as_str().to_string(),
        adapter_mode: source.mode.as_str().to_string(),
        ..Default::default()
    };

    match (source.adapter_type, source_config) {
        (AdapterType::Soap, AdapterConfig::Soap(config)) => {
            metadata.wsdl_url = Some(format!("{}?wsdl", endpoint));
            metadata.soap_version = Some(if config.is_soap12() { "1.2" } else { "1.1" }.to_string());
        }
        (AdapterType::Rest, _) => {
            metadata.api_docs_url = Some(format!("{}/docs", endpoint));
            metadata.open_api_url = Some(format!("{}/openapi.json", endpoint));
        }
        (AdapterType::Http, AdapterConfig::Http(config)) => {
            metadata.http_methods = Some("POST, GET".to_string());
            metadata.content_type = Some(config.content_type().to_string());
        }
        (AdapterType::File | AdapterType::Ftp | AdapterType::Sftp, config) => {
            metadata.polling_enabled = Some(true);
            let pattern = match config {
                AdapterConfig::File(c) => c.file_pattern.clone(),
                _ => None,
            };
            metadata.file_pattern = Some(pattern.unwrap_or_else(|| "*.*".to_string()));
        }
        _ => {}
    }

    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::adapter::{AdapterId, AdapterMode};
    use serde_json::json;

    fn flow(name: &str) -> IntegrationFlow {
        IntegrationFlow::new(FlowId::from("f1"), name, AdapterId::from("s"), AdapterId::from("t"))
    }

    fn endpoint_for(adapter: &AdapterDescriptor, name: &str) -> String {
        let config = adapter.typed_config().unwrap();
        generate_endpoint(&EndpointSettings::default(), &flow(name), adapter, &config)
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Order Sync_v2!"), "order-sync-v2-");
        assert_eq!(slugify("abc-DEF"), "abc-def");
    }

    #[test]
    fn test_derived_endpoints_by_type() {
        let soap = AdapterDescriptor::new("s", "in", AdapterType::Soap, AdapterMode::Sender);
        assert_eq!(endpoint_for(&soap, "Order Sync"), "http://localhost:8080/soap/order-sync");

        let rest = AdapterDescriptor::new("s", "in", AdapterType::Rest, AdapterMode::Sender);
        assert_eq!(
            endpoint_for(&rest, "Order Sync"),
            "http://localhost:8080/api/integration/order-sync"
        );

        let file = AdapterDescriptor::new("s", "in", AdapterType::File, AdapterMode::Sender);
        assert_eq!(
            endpoint_for(&file, "Order Sync"),
            "file:///opt/integrixflowbridge/flows/order-sync"
        );
    }

    #[test]
    fn test_push_path_is_normalized_and_prefixed() {
        let soap = AdapterDescriptor::new("s", "in", AdapterType::Soap, AdapterMode::Sender)
            .with_config(json!({"connectionMode": "PUSH", "serviceEndpointUrl": "orders/v1"}));
        assert_eq!(endpoint_for(&soap, "x"), "http://localhost:8080/soap/orders/v1");

        let already = AdapterDescriptor::new("s", "in", AdapterType::Soap, AdapterMode::Sender)
            .with_config(json!({"connectionMode": "PUSH", "serviceEndpointUrl": "/soap/orders"}));
        assert_eq!(endpoint_for(&already, "x"), "http://localhost:8080/soap/orders");

        let http = AdapterDescriptor::new("s", "in", AdapterType::Http, AdapterMode::Sender)
            .with_config(json!({"connectionMode": "PUSH", "serviceEndpointUrl": "/hooks/in"}));
        assert_eq!(endpoint_for(&http, "x"), "http://localhost:8080/hooks/in");
    }

    #[test]
    fn test_poll_mode_ignores_service_path() {
        let soap = AdapterDescriptor::new("s", "in", AdapterType::Soap, AdapterMode::Sender)
            .with_config(json!({"connectionMode": "POLL", "serviceEndpointUrl": "/orders"}));
        assert_eq!(endpoint_for(&soap, "Orders"), "http://localhost:8080/soap/orders");
    }

    #[test]
    fn test_metadata_hints() {
        let soap = AdapterDescriptor::new("s", "in", AdapterType::Soap, AdapterMode::Sender)
            .with_config(json!({"soapVersion": "1.2"}));
        let config = soap.typed_config().unwrap();
        let metadata = build_metadata(&flow("Orders"), &soap, &config, "http://h/soap/orders");
        assert_eq!(metadata.wsdl_url.as_deref(), Some("http://h/soap/orders?wsdl"));
        assert_eq!(metadata.soap_version.as_deref(), Some("1.2"));
        assert_eq!(metadata.adapter_mode, "SENDER");

        let rest = AdapterDescriptor::new("s", "in", AdapterType::Rest, AdapterMode::Sender);
        let config = rest.typed_config().unwrap();
        let metadata = build_metadata(&flow("Orders"), &rest, &config, "http://h/api/integration/orders");
        assert_eq!(
            metadata.open_api_url.as_deref(),
            Some("http://h/api/integration/orders/openapi.json")
        );

        let file = AdapterDescriptor::new("s", "in", AdapterType::File, AdapterMode::Sender);
        let config = file.typed_config().unwrap();
        let metadata = build_metadata(&flow("Orders"), &file, &config, "file:///x");
        assert_eq!(metadata.polling_enabled, Some(true));
        assert_eq!(metadata.file_pattern.as_deref(), Some("*.*"));
    }
}
