//! In-memory state store for the FlowBridge integration engine
//!
//! This crate provides in-memory implementations of the repository and
//! collaborator ports defined in flowbridge-core, plus the bounded message
//! log. It is useful for development, testing and single-node deployments
//! where persistence is not required.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod repositories;
pub use repositories::{
    InMemoryAdapterRepository, InMemoryFieldMappingRepository, InMemoryFlowRepository,
    InMemoryFunctionRegistry, InMemoryLookupTables, InMemoryTemplateRepository,
    InMemoryTransformationRepository,
};

pub mod message_log;
pub use message_log::{InMemoryMessageLog, MessageLogEntry, RetentionPolicy};

use flowbridge_core::{
    AdapterDescriptor, AdapterId, AdapterRepository, FieldMapping, FieldMappingRepository, FlowId,
    FlowRepository, FunctionRegistry, IntegrationFlow, LookupSource, TemplateRepository,
    TransformationRepository, TransformationStep,
};

/// Repositories sharing one provider's storage
#[derive(Clone)]
pub struct Repositories {
    pub flows: Arc<dyn FlowRepository>,
    pub adapters: Arc<dyn AdapterRepository>,
    pub steps: Arc<dyn TransformationRepository>,
    pub mappings: Arc<dyn FieldMappingRepository>,
    pub functions: Arc<dyn FunctionRegistry>,
    pub templates: Arc<dyn TemplateRepository>,
    pub lookups: Arc<dyn LookupSource>,
}

/// Provider for in-memory repositories
pub struct InMemoryStateStoreProvider {
    // Shared storage; every repository created by this provider sees the same data
    flows: Arc<RwLock<HashMap<FlowId, IntegrationFlow>>>,
    adapters: Arc<RwLock<HashMap<AdapterId, AdapterDescriptor>>>,
    steps: Arc<RwLock<Vec<TransformationStep>>>,
    mappings: Arc<RwLock<Vec<FieldMapping>>>,

    functions: Arc<InMemoryFunctionRegistry>,
    templates: Arc<InMemoryTemplateRepository>,
    lookups: Arc<InMemoryLookupTables>,
}

impl InMemoryStateStoreProvider {
    /// Create an empty provider
    pub fn new() -> Self {
        Self {
            flows: Arc::new(RwLock::new(HashMap::new())),
            adapters: Arc::new(RwLock::new(HashMap::new())),
            steps: Arc::new(RwLock::new(Vec::new())),
            mappings: Arc::new(RwLock::new(Vec::new())),
            functions: Arc::new(InMemoryFunctionRegistry::new()),
            templates: Arc::new(InMemoryTemplateRepository::new()),
            lookups: Arc::new(InMemoryLookupTables::new()),
        }
    }

    /// Create repositories over the shared storage
    pub fn create_repositories(&self) -> Repositories {
        Repositories {
            flows: Arc::new(InMemoryFlowRepository::new(self.flows.clone())),
            adapters: Arc::new(InMemoryAdapterRepository::new(self.adapters.clone())),
            steps: Arc::new(InMemoryTransformationRepository::new(self.steps.clone())),
            mappings: Arc::new(InMemoryFieldMappingRepository::new(self.mappings.clone())),
            functions: self.functions.clone(),
            templates: self.templates.clone(),
            lookups: self.lookups.clone(),
        }
    }

    /// Function registry, for seeding
    pub fn functions(&self) -> &Arc<InMemoryFunctionRegistry> {
        &self.functions
    }

    /// Template store, for seeding
    pub fn templates(&self) -> &Arc<InMemoryTemplateRepository> {
        &self.templates
    }

    /// Lookup tables, for seeding
    pub fn lookups(&self) -> &Arc<InMemoryLookupTables> {
        &self.lookups
    }
}

impl Default for InMemoryStateStoreProvider {
    fn default() -> Self {
        Self::new()
    }
}
