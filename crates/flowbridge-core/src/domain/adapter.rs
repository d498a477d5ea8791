use crate::domain::conversion::{FileFormat, FlatFileOptions};
use crate::CoreError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Value object: Adapter ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AdapterId(pub String);

impl fmt::Display for AdapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AdapterId {
    fn from(s: &str) -> Self {
        AdapterId(s.to_string())
    }
}

/// Protocol spoken by an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AdapterType {
    /// SOAP 1.1 / 1.2 over HTTP
    Soap,
    /// REST over HTTP
    Rest,
    /// Plain HTTP
    Http,
    /// Local file system
    File,
    /// FTP server
    Ftp,
    /// SFTP server
    Sftp,
}

impl AdapterType {
    /// Wire name of the protocol
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterType::Soap => "SOAP",
            AdapterType::Rest => "REST",
            AdapterType::Http => "HTTP",
            AdapterType::File => "FILE",
            AdapterType::Ftp => "FTP",
            AdapterType::Sftp => "SFTP",
        }
    }

    /// FILE, FTP and SFTP
    pub fn is_file_based(&self) -> bool {
        matches!(self, AdapterType::File | AdapterType::Ftp | AdapterType::Sftp)
    }
}

impl fmt::Display for AdapterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adapter direction.
///
/// NOTE: the naming is inverted relative to data flow and kept that way on
/// purpose. A `Sender` adapter *receives* data from an external system (it is
/// the source end of a flow). A `Receiver` adapter *sends* data to an external
/// system (it is the target end of a flow). Do not "fix" the names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AdapterMode {
    /// Inbound origin: pulls or accepts data from an external system
    Sender,
    /// Outbound origin: pushes data to an external system
    Receiver,
}

impl AdapterMode {
    /// Wire name of the mode
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterMode::Sender => "SENDER",
            AdapterMode::Receiver => "RECEIVER",
        }
    }
}

/// How a source adapter obtains messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionMode {
    /// External systems call the published endpoint
    Push,
    /// The engine polls the external system
    Poll,
}

/// An adapter instance as stored in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterDescriptor {
    /// Unique identifier
    pub id: AdapterId,

    /// Display name
    pub name: String,

    /// Protocol type
    #[serde(rename = "type")]
    pub adapter_type: AdapterType,

    /// Direction (see [`AdapterMode`] for the inverted naming)
    pub mode: AdapterMode,

    /// Adapters must be active to take part in a flow
    #[serde(default)]
    pub active: bool,

    /// Protocol specific key/value configuration
    #[serde(default)]
    pub configuration: Map<String, Value>,
}

impl AdapterDescriptor {
    /// Create an active adapter with an empty configuration
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        adapter_type: AdapterType,
        mode: AdapterMode,
    ) -> Self {
        Self {
            id: AdapterId(id.into()),
            name: name.into(),
            adapter_type,
            mode,
            active: true,
            configuration: Map::new(),
        }
    }

    /// Builder: replace the configuration with the entries of a JSON object
    pub fn with_config(mut self, config: Value) -> Self {
        if let Value::Object(map) = config {
            self.configuration = map;
        }
        self
    }

    /// Builder: set the active flag
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Raw string value of a configuration key
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.configuration.get(key).and_then(Value::as_str)
    }

    /// Parse the configuration blob into the typed configuration for this
    /// adapter's protocol. Unknown keys are ignored.
    pub fn typed_config(&self) -> Result<AdapterConfig, CoreError> {
        Ok(match self.adapter_type {
            AdapterType::Soap => AdapterConfig::Soap(self.parse_config()?),
            AdapterType::Rest | AdapterType::Http => AdapterConfig::Http(self.parse_config()?),
            AdapterType::File => AdapterConfig::File(self.parse_config()?),
            AdapterType::Ftp | AdapterType::Sftp => AdapterConfig::Ftp(self.parse_config()?),
        })
    }

    fn parse_config<T: DeserializeOwned>(&self) -> Result<T, CoreError> {
        serde_json::from_value(Value::Object(self.configuration.clone())).map_err(|e| {
            CoreError::ConfigurationError(format!(
                "Invalid {} configuration for adapter '{}': {}",
                self.adapter_type, self.name, e
            ))
        })
    }
}

/// Typed adapter configuration, one variant per protocol family
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterConfig {
    /// SOAP
    Soap(SoapAdapterConfig),
    /// HTTP and REST
    Http(HttpAdapterConfig),
    /// Local files
    File(FileAdapterConfig),
    /// FTP and SFTP
    Ftp(FtpAdapterConfig),
}

impl AdapterConfig {
    /// Connection mode declared by the adapter, if any
    pub fn connection_mode(&self) -> Option<ConnectionMode> {
        match self {
            AdapterConfig::Soap(c) => c.connection_mode,
            AdapterConfig::Http(c) => c.connection_mode,
            AdapterConfig::File(c) => c.connection_mode,
            AdapterConfig::Ftp(c) => c.connection_mode,
        }
    }

    /// Explicitly configured inbound path, if any
    pub fn service_endpoint_url(&self) -> Option<&str> {
        match self {
            AdapterConfig::Soap(c) => c.service_endpoint_url.as_deref(),
            AdapterConfig::Http(c) => c.service_endpoint_url.as_deref(),
            AdapterConfig::File(c) => c.service_endpoint_url.as_deref(),
            AdapterConfig::Ftp(_) => None,
        }
    }
}

/// SOAP adapter configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SoapAdapterConfig {
    /// Highest priority endpoint
    pub target_endpoint_url: Option<String>,
    /// Second priority endpoint; also the PUSH-mode inbound path
    pub service_endpoint_url: Option<String>,
    /// Fallback endpoint
    pub endpoint: Option<String>,
    /// `SOAPAction` header value
    pub soap_action: Option<String>,
    /// `1.1` (default) or `1.2`
    pub soap_version: Option<String>,
    /// PUSH or POLL
    pub connection_mode: Option<ConnectionMode>,
    /// WSDL document served for `?wsdl`
    pub wsdl_content: Option<String>,
    /// Body sent when polling the service
    pub request_payload: Option<String>,
    /// Per-call timeout override
    pub timeout_seconds: Option<u64>,
}

impl SoapAdapterConfig {
    /// Endpoint in priority order `targetEndpointUrl`, `serviceEndpointUrl`, `endpoint`
    pub fn resolve_endpoint(&self) -> Result<&str, CoreError> {
        [
            &self.target_endpoint_url,
            &self.service_endpoint_url,
            &self.endpoint,
        ]
        .into_iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .ok_or_else(|| {
            CoreError::ConfigurationError(
                "SOAP adapter requires one of targetEndpointUrl, serviceEndpointUrl or endpoint"
                    .to_string(),
            )
        })
    }

    /// Whether SOAP 1.2 framing is configured
    pub fn is_soap12(&self) -> bool {
        self.soap_version.as_deref().map(str::trim) == Some("1.2")
    }

    /// HTTP content type for the configured SOAP version
    pub fn content_type(&self) -> &'static str {
        if self.is_soap12() {
            "application/soap+xml; charset=utf-8"
        } else {
            "text/xml; charset=utf-8"
        }
    }
}

/// HTTP / REST adapter configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpAdapterConfig {
    /// Target URL
    pub endpoint: Option<String>,
    /// Method used for sends, `POST` when absent
    pub method: Option<String>,
    /// Method used for polling, `GET` when absent
    pub poll_method: Option<String>,
    /// Content type, `application/json` when absent
    pub content_type: Option<String>,
    /// Extra request headers
    pub headers: BTreeMap<String, String>,
    /// PUSH or POLL
    pub connection_mode: Option<ConnectionMode>,
    /// PUSH-mode inbound path
    pub service_endpoint_url: Option<String>,
    /// Per-call timeout override
    pub timeout_seconds: Option<u64>,
}

impl HttpAdapterConfig {
    /// Endpoint, required
    pub fn endpoint(&self) -> Result<&str, CoreError> {
        self.endpoint
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                CoreError::ConfigurationError("HTTP adapter requires an endpoint".to_string())
            })
    }

    /// Send method
    pub fn method(&self) -> &str {
        self.method.as_deref().unwrap_or("POST")
    }

    /// Poll method
    pub fn poll_method(&self) -> &str {
        self.poll_method.as_deref().unwrap_or("GET")
    }

    /// Content type
    pub fn content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or("application/json")
    }
}

/// FILE adapter configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileAdapterConfig {
    /// Directory written to or read from
    pub directory: Option<String>,
    /// Output file name with `{timestamp}`, `{uuid}` and `{flowId}` placeholders
    pub file_name_pattern: Option<String>,
    /// Glob (`*`, `?`) selecting files to read
    pub file_pattern: Option<String>,
    /// Remove a file once it has been read
    pub delete_after_read: bool,
    /// Flat file format
    pub file_format: FileFormat,
    /// PUSH or POLL
    pub connection_mode: Option<ConnectionMode>,
    /// PUSH-mode inbound path
    pub service_endpoint_url: Option<String>,
    /// CSV, fixed-length and SQL options
    #[serde(flatten)]
    pub format: FlatFileOptions,
}

impl FileAdapterConfig {
    /// Directory, required
    pub fn directory(&self) -> Result<&str, CoreError> {
        self.directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                CoreError::ConfigurationError("FILE adapter requires a directory".to_string())
            })
    }

    /// Output file name pattern
    pub fn file_name_pattern(&self) -> &str {
        self.file_name_pattern
            .as_deref()
            .unwrap_or("output-{timestamp}.txt")
    }

    /// Input file glob
    pub fn file_pattern(&self) -> &str {
        self.file_pattern.as_deref().unwrap_or("*")
    }
}

/// FTP / SFTP adapter configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FtpAdapterConfig {
    /// Server host
    pub host: Option<String>,
    /// Server port
    pub port: Option<u16>,
    /// Login user
    pub username: Option<String>,
    /// Remote directory
    pub directory: Option<String>,
    /// PUSH or POLL
    pub connection_mode: Option<ConnectionMode>,
    /// Flat file format
    pub file_format: FileFormat,
    /// CSV, fixed-length and SQL options
    #[serde(flatten)]
    pub format: FlatFileOptions,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_soap_endpoint_priority() {
        let adapter = AdapterDescriptor::new("a", "svc", AdapterType::Soap, AdapterMode::Receiver)
            .with_config(json!({
                "endpoint": "http://fallback",
                "serviceEndpointUrl": "http://service",
                "targetEndpointUrl": "http://target"
            }));
        let AdapterConfig::Soap(config) = adapter.typed_config().unwrap() else {
            panic!("expected SOAP config");
        };
        assert_eq!(config.resolve_endpoint().unwrap(), "http://target");

        let config = SoapAdapterConfig {
            service_endpoint_url: Some("http://service".to_string()),
            endpoint: Some("http://fallback".to_string()),
            ..Default::default()
        };
        assert_eq!(config.resolve_endpoint().unwrap(), "http://service");
    }

    #[test]
    fn test_soap_endpoint_missing() {
        let config = SoapAdapterConfig::default();
        assert!(matches!(
            config.resolve_endpoint(),
            Err(CoreError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_soap_content_type_by_version() {
        let mut config = SoapAdapterConfig::default();
        assert!(config.content_type().starts_with("text/xml"));
        config.soap_version = Some("1.2".to_string());
        assert!(config.content_type().starts_with("application/soap+xml"));
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let adapter = AdapterDescriptor::new("h", "api", AdapterType::Rest, AdapterMode::Receiver)
            .with_config(json!({
                "endpoint": "http://int/api",
                "somethingElse": 42,
                "headers": {"X-Trace": "1"}
            }));
        let AdapterConfig::Http(config) = adapter.typed_config().unwrap() else {
            panic!("expected HTTP config");
        };
        assert_eq!(config.endpoint().unwrap(), "http://int/api");
        assert_eq!(config.method(), "POST");
        assert_eq!(config.content_type(), "application/json");
        assert_eq!(config.headers.get("X-Trace").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_file_config_defaults() {
        let adapter = AdapterDescriptor::new("f", "drop", AdapterType::File, AdapterMode::Receiver)
            .with_config(json!({"directory": "/tmp/out", "fileFormat": "FIXED", "padCharacter": "0"}));
        let AdapterConfig::File(config) = adapter.typed_config().unwrap() else {
            panic!("expected FILE config");
        };
        assert_eq!(config.file_name_pattern(), "output-{timestamp}.txt");
        assert_eq!(config.file_format, FileFormat::Fixed);
        assert_eq!(config.format.pad_character, "0");
        assert_eq!(config.format.delimiter, ",");
    }

    #[test]
    fn test_descriptor_wire_shape() {
        let adapter: AdapterDescriptor = serde_json::from_value(json!({
            "id": "a1",
            "name": "orders-in",
            "type": "SOAP",
            "mode": "SENDER",
            "active": true,
            "configuration": {"serviceEndpointUrl": "/orders", "connectionMode": "PUSH"}
        }))
        .unwrap();
        assert_eq!(adapter.adapter_type, AdapterType::Soap);
        assert_eq!(adapter.mode, AdapterMode::Sender);
        let config = adapter.typed_config().unwrap();
        assert_eq!(config.connection_mode(), Some(ConnectionMode::Push));
        assert_eq!(config.service_endpoint_url(), Some("/orders"));
    }
}
