//!
//! FlowBridge Core - flow execution engine for the FlowBridge integration platform
//!
//! This crate defines the domain model, the collaborator ports, SOAP framing
//! and the services that execute, deploy and route integration flows.
//! Concrete adapters and transformation steps live in `flowbridge-stdlib`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;

/// Domain layer - flows, adapters, steps and ports
pub mod domain;

/// Application services - orchestration, deployment and routing
pub mod application;

/// Core types
pub mod types;

/// Error types
pub mod error;

/// XML DOM, XPath subset and SOAP codec
pub mod xml;

// Re-export key types
pub use error::CoreError;
pub use types::{LogLevel, Payload};

pub use application::deployment_service::FlowDeploymentService;
pub use application::endpoint_service::IntegrationEndpointService;
pub use application::flow_execution_service::FlowExecutionService;
pub use application::polling_scheduler::PollingScheduler;
pub use application::transformation_pipeline::{
    PipelineOutcome, StepExecutors, TransformationPipeline,
};

pub use domain::adapter::{
    AdapterConfig, AdapterDescriptor, AdapterId, AdapterMode, AdapterType, ConnectionMode,
};
pub use domain::conversion::{ConversionConfig, TargetFormat};
pub use domain::correlation::{
    CorrelationContext, CorrelationId, Direction, PayloadCapture, PayloadKind, ProcessingEvent,
};
pub use domain::deployment::{DeploymentInfo, DeploymentMetadata, EndpointSettings};
pub use domain::execution::{ExecutionRecord, ExecutionReport, ExecutionState, FlowOutcome};
pub use domain::flow::{FlowId, FlowStatus, IntegrationFlow, MappingMode};
pub use domain::repository::{
    AdapterRepository, ExecutionRecorder, FieldMappingRepository, FlowRepository,
    FunctionRegistry, LookupSource, TemplateRepository, TransformationRepository,
};
pub use domain::transformation::{
    FieldMapping, StepId, TransformationFunction, TransformationKind, TransformationStep,
};

/// Uniform interface over protocol-specific clients.
///
/// Implementations dispatch on the adapter's protocol and must capture the
/// request and response payloads of every call on the correlation context.
#[async_trait]
pub trait AdapterGateway: Send + Sync {
    /// Pull a payload from a source adapter. Binary content is reported as
    /// [`Payload::Binary`].
    async fn fetch(
        &self,
        adapter: &AdapterDescriptor,
        ctx: &CorrelationContext,
    ) -> Result<Payload, CoreError>;

    /// Push a payload to a target adapter and return its response
    async fn send(
        &self,
        adapter: &AdapterDescriptor,
        payload: &Payload,
        ctx: &CorrelationContext,
    ) -> Result<Payload, CoreError>;
}

/// Result of a single transformation step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Continue with this payload
    Continue(String),
    /// Drop the message; this is not an error
    Filtered {
        /// Why the message was dropped
        reason: String,
    },
}

/// Executes one kind of transformation step
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Apply the step to the current payload
    async fn apply(&self, step: &TransformationStep, input: &str) -> Result<StepOutcome, CoreError>;
}

/// Converts between adapter-native formats and the pipeline's XML form
pub trait FormatConverter: Send + Sync {
    /// Raw source payload to XML, according to the source adapter type
    fn to_xml(&self, payload: &str, source: &AdapterDescriptor) -> Result<String, CoreError>;

    /// Pipeline XML to the target adapter's native format
    fn from_xml(&self, xml: &str, config: &ConversionConfig) -> Result<String, CoreError>;
}
