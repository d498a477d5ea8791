use thiserror::Error;

/// Core error type for the FlowBridge runtime
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Flow, adapter, step or mapping missing
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity that was looked up
        entity: String,
        /// Identifier used for the lookup
        id: String,
    },

    /// Missing or invalid adapter/step configuration
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// An adapter taking part in a flow is not active
    #[error("{role} adapter '{adapter}' is not active")]
    AdapterInactive {
        /// `source` or `target`
        role: String,
        /// Adapter name
        adapter: String,
    },

    /// Transport or protocol failure talking to an external system
    #[error("{protocol} adapter call to {endpoint} failed: {cause}")]
    AdapterExecutionError {
        /// Endpoint, directory or host the adapter talked to
        endpoint: String,
        /// Adapter protocol type
        protocol: String,
        /// Underlying failure
        cause: String,
    },

    /// SOAP envelope could not be parsed or has no body element
    #[error("Malformed SOAP envelope: {0}")]
    MalformedEnvelope(String),

    /// Transformation step configuration is missing or invalid
    #[error("Transformation configuration error: {0}")]
    TransformationConfigError(String),

    /// Payload violates one or more validation rules
    #[error("Validation failed: {}", .0.join("; "))]
    ValidationError(Vec<String>),

    /// Deployment state transition not allowed
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Adapter or transformation kind without an implementation
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// No deployed flow serves the requested path
    #[error("No deployed flow found for path: {0}")]
    NoDeployedFlow(String),

    /// A transformation step failed
    #[error("{kind} step '{step}' failed: {source}")]
    StepExecutionError {
        /// Step name
        step: String,
        /// Step kind
        kind: String,
        /// Underlying failure
        source: Box<CoreError>,
    },

    /// A flow execution failed
    #[error("Flow processing failed for '{flow}': {source}")]
    FlowExecutionError {
        /// Flow name
        flow: String,
        /// Underlying failure
        source: Box<CoreError>,
    },

    /// XML parsing or XPath error
    #[error("XML error: {0}")]
    XmlError(String),

    /// State store error
    #[error("State store error: {0}")]
    StateStoreError(String),

    /// Input/output error
    #[error("Input/output error: {0}")]
    IOError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// Shorthand for [`CoreError::NotFound`]
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Innermost error of a wrapped chain
    pub fn root_cause(&self) -> &CoreError {
        match self {
            CoreError::StepExecutionError { source, .. }
            | CoreError::FlowExecutionError { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Stable taxonomy name used in API error payloads
    pub fn error_type(&self) -> &'static str {
        match self.root_cause() {
            CoreError::NotFound { .. } => "NotFoundError",
            CoreError::ConfigurationError(_) => "ConfigurationError",
            CoreError::AdapterInactive { .. } => "AdapterInactiveError",
            CoreError::AdapterExecutionError { .. } => "AdapterExecutionError",
            CoreError::MalformedEnvelope(_) => "MalformedEnvelopeError",
            CoreError::TransformationConfigError(_) => "TransformationConfigError",
            CoreError::ValidationError(_) => "ValidationError",
            CoreError::IllegalState(_) => "IllegalStateError",
            CoreError::UnsupportedOperation(_) => "UnsupportedOperationError",
            CoreError::NoDeployedFlow(_) => "NoDeployedFlowError",
            CoreError::XmlError(_) => "XmlError",
            CoreError::StateStoreError(_) => "StateStoreError",
            CoreError::IOError(_) => "IOError",
            CoreError::SerializationError(_) => "SerializationError",
            CoreError::StepExecutionError { .. }
            | CoreError::FlowExecutionError { .. }
            | CoreError::Other(_) => "InternalError",
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::IOError(err.to_string())
    }
}

impl From<quick_xml::Error> for CoreError {
    fn from(err: quick_xml::Error) -> Self {
        CoreError::XmlError(err.to_string())
    }
}

impl From<String> for CoreError {
    fn from(err: String) -> Self {
        CoreError::Other(err)
    }
}

impl From<&str> for CoreError {
    fn from(err: &str) -> Self {
        CoreError::Other(err.to_string())
    }
}
