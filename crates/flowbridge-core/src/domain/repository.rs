//! Repository and collaborator ports for the FlowBridge core
//!
//! Persistence, function storage, lookups and the message log are external
//! collaborators. External crates implement these traits; the core only
//! sees plain records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::adapter::{AdapterDescriptor, AdapterId};
use super::correlation::{CorrelationId, PayloadCapture, ProcessingEvent};
use super::execution::ExecutionRecord;
use super::flow::{FlowId, FlowStatus, IntegrationFlow};
use super::transformation::{FieldMapping, StepId, TransformationFunction, TransformationStep};
use crate::CoreError;

/// Repository for integration flows
#[async_trait]
pub trait FlowRepository: Send + Sync {
    /// Find a flow by ID
    async fn find_by_id(&self, id: &FlowId) -> Result<Option<IntegrationFlow>, CoreError>;

    /// List every flow
    async fn find_all(&self) -> Result<Vec<IntegrationFlow>, CoreError>;

    /// Save a flow unconditionally
    async fn save(&self, flow: &IntegrationFlow) -> Result<(), CoreError>;

    /// Compare-and-set: store `flow` only if the stored status still equals
    /// `expected`. Returns `false` (and writes nothing) otherwise.
    async fn save_if_status(
        &self,
        flow: &IntegrationFlow,
        expected: FlowStatus,
    ) -> Result<bool, CoreError>;

    /// Bump execution counters without touching deployment fields
    async fn record_execution(
        &self,
        id: &FlowId,
        success: bool,
        at: DateTime<Utc>,
    ) -> Result<(), CoreError>;
}

/// Repository for adapter descriptors
#[async_trait]
pub trait AdapterRepository: Send + Sync {
    /// Find an adapter by ID
    async fn find_by_id(&self, id: &AdapterId) -> Result<Option<AdapterDescriptor>, CoreError>;

    /// Save an adapter
    async fn save(&self, adapter: &AdapterDescriptor) -> Result<(), CoreError>;
}

/// Repository for transformation steps
#[async_trait]
pub trait TransformationRepository: Send + Sync {
    /// All steps of a flow, in storage order
    async fn find_by_flow(&self, flow_id: &FlowId) -> Result<Vec<TransformationStep>, CoreError>;

    /// Save a step
    async fn save(&self, step: &TransformationStep) -> Result<(), CoreError>;
}

/// Repository for field mapping rows
#[async_trait]
pub trait FieldMappingRepository: Send + Sync {
    /// All mappings of a step, in storage order
    async fn find_by_step(&self, step_id: &StepId) -> Result<Vec<FieldMapping>, CoreError>;

    /// Save a mapping
    async fn save(&self, mapping: &FieldMapping) -> Result<(), CoreError>;
}

/// Named function storage
#[async_trait]
pub trait FunctionRegistry: Send + Sync {
    /// Find a function by name
    async fn find_function(&self, name: &str) -> Result<Option<TransformationFunction>, CoreError>;
}

/// Source of target templates (message structures)
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// Template XML of a message structure
    async fn find_template(&self, structure_id: &str) -> Result<Option<String>, CoreError>;
}

/// Secondary data used by ENRICHMENT steps
#[async_trait]
pub trait LookupSource: Send + Sync {
    /// Look a key up in a table
    async fn lookup(&self, table: &str, key: &str) -> Result<Option<Value>, CoreError>;
}

/// Message log collaborator.
///
/// Calls are made on detached tasks; errors are logged by the caller and
/// never affect the execution.
#[async_trait]
pub trait ExecutionRecorder: Send + Sync {
    /// Store a captured adapter payload
    async fn record_payload(&self, capture: PayloadCapture) -> Result<(), CoreError>;

    /// Store a processing-step event
    async fn record_event(
        &self,
        correlation_id: &CorrelationId,
        event: ProcessingEvent,
    ) -> Result<(), CoreError>;

    /// Store the final outcome of an execution
    async fn record_outcome(&self, record: ExecutionRecord) -> Result<(), CoreError>;
}
