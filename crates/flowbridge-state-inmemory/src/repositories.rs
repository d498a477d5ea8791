use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use flowbridge_core::{
    AdapterDescriptor, AdapterId, AdapterRepository, CoreError, FieldMapping, FieldMappingRepository,
    FlowId, FlowRepository, FlowStatus, FunctionRegistry, IntegrationFlow, LookupSource, StepId,
    TemplateRepository, TransformationFunction, TransformationRepository, TransformationStep,
};

/// In-memory implementation of the FlowRepository
pub struct InMemoryFlowRepository {
    flows: Arc<RwLock<HashMap<FlowId, IntegrationFlow>>>,
}

impl InMemoryFlowRepository {
    /// Create a new in-memory flow repository
    pub fn new(flows: Arc<RwLock<HashMap<FlowId, IntegrationFlow>>>) -> Self {
        Self { flows }
    }
}

#[async_trait]
impl FlowRepository for InMemoryFlowRepository {
    async fn find_by_id(&self, id: &FlowId) -> Result<Option<IntegrationFlow>, CoreError> {
        let flows = self.flows.read().await;
        Ok(flows.get(id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<IntegrationFlow>, CoreError> {
        let flows = self.flows.read().await;
        let mut all: Vec<IntegrationFlow> = flows.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn save(&self, flow: &IntegrationFlow) -> Result<(), CoreError> {
        let mut flows = self.flows.write().await;
        let duplicate = flows
            .values()
            .any(|existing| existing.id != flow.id && existing.name == flow.name);
        if duplicate {
            return Err(CoreError::ConfigurationError(format!(
                "A flow named '{}' already exists",
                flow.name
            )));
        }
        flows.insert(flow.id.clone(), flow.clone());
        Ok(())
    }

    async fn save_if_status(
        &self,
        flow: &IntegrationFlow,
        expected: FlowStatus,
    ) -> Result<bool, CoreError> {
        // read, compare and write under one write guard
        let mut flows = self.flows.write().await;
        match flows.get(&flow.id) {
            Some(stored) if stored.status == expected => {
                flows.insert(flow.id.clone(), flow.clone());
                Ok(true)
            }
            Some(stored) => {
                debug!(flow_id = %flow.id, current = stored.status.as_str(), expected = expected.as_str(), "Status changed concurrently");
                Ok(false)
            }
            None => Err(CoreError::not_found("Flow", &flow.id.0)),
        }
    }

    async fn record_execution(
        &self,
        id: &FlowId,
        success: bool,
        at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let mut flows = self.flows.write().await;
        let flow = flows
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("Flow", &id.0))?;
        flow.record_execution(success, at);
        Ok(())
    }
}

/// In-memory implementation of the AdapterRepository
pub struct InMemoryAdapterRepository {
    adapters: Arc<RwLock<HashMap<AdapterId, AdapterDescriptor>>>,
}

impl InMemoryAdapterRepository {
    /// Create a new in-memory adapter repository
    pub fn new(adapters: Arc<RwLock<HashMap<AdapterId, AdapterDescriptor>>>) -> Self {
        Self { adapters }
    }
}

#[async_trait]
impl AdapterRepository for InMemoryAdapterRepository {
    async fn find_by_id(&self, id: &AdapterId) -> Result<Option<AdapterDescriptor>, CoreError> {
        let adapters = self.adapters.read().await;
        Ok(adapters.get(id).cloned())
    }

    async fn save(&self, adapter: &AdapterDescriptor) -> Result<(), CoreError> {
        let mut adapters = self.adapters.write().await;
        adapters.insert(adapter.id.clone(), adapter.clone());
        Ok(())
    }
}

/// In-memory implementation of the TransformationRepository.
///
/// Steps are kept in insertion order; saving an existing id replaces it in place.
pub struct InMemoryTransformationRepository {
    steps: Arc<RwLock<Vec<TransformationStep>>>,
}

impl InMemoryTransformationRepository {
    /// Create a new in-memory transformation step repository
    pub fn new(steps: Arc<RwLock<Vec<TransformationStep>>>) -> Self {
        Self { steps }
    }
}

#[async_trait]
impl TransformationRepository for InMemoryTransformationRepository {
    async fn find_by_flow(&self, flow_id: &FlowId) -> Result<Vec<TransformationStep>, CoreError> {
        let steps = self.steps.read().await;
        Ok(steps
            .iter()
            .filter(|step| &step.flow_id == flow_id)
            .cloned()
            .collect())
    }

    async fn save(&self, step: &TransformationStep) -> Result<(), CoreError> {
        let mut steps = self.steps.write().await;
        match steps.iter_mut().find(|existing| existing.id == step.id) {
            Some(existing) => *existing = step.clone(),
            None => steps.push(step.clone()),
        }
        Ok(())
    }
}

/// In-memory implementation of the FieldMappingRepository
pub struct InMemoryFieldMappingRepository {
    mappings: Arc<RwLock<Vec<FieldMapping>>>,
}

impl InMemoryFieldMappingRepository {
    /// Create a new in-memory field mapping repository
    pub fn new(mappings: Arc<RwLock<Vec<FieldMapping>>>) -> Self {
        Self { mappings }
    }
}

#[async_trait]
impl FieldMappingRepository for InMemoryFieldMappingRepository {
    async fn find_by_step(&self, step_id: &StepId) -> Result<Vec<FieldMapping>, CoreError> {
        let mappings = self.mappings.read().await;
        Ok(mappings
            .iter()
            .filter(|mapping| &mapping.step_id == step_id)
            .cloned()
            .collect())
    }

    async fn save(&self, mapping: &FieldMapping) -> Result<(), CoreError> {
        if mapping.source_fields.is_empty() {
            return Err(CoreError::ConfigurationError(format!(
                "Field mapping '{}' has no source fields",
                mapping.id
            )));
        }
        let mut mappings = self.mappings.write().await;
        match mappings.iter_mut().find(|existing| existing.id == mapping.id) {
            Some(existing) => *existing = mapping.clone(),
            None => mappings.push(mapping.clone()),
        }
        Ok(())
    }
}

/// Named functions keyed by name
#[derive(Default)]
pub struct InMemoryFunctionRegistry {
    functions: RwLock<HashMap<String, TransformationFunction>>,
}

impl InMemoryFunctionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a function
    pub async fn register(&self, function: TransformationFunction) {
        debug!(name = %function.name, "Registering function");
        self.functions.write().await.insert(function.name.clone(), function);
    }
}

#[async_trait]
impl FunctionRegistry for InMemoryFunctionRegistry {
    async fn find_function(&self, name: &str) -> Result<Option<TransformationFunction>, CoreError> {
        Ok(self.functions.read().await.get(name).cloned())
    }
}

/// Target templates keyed by message structure id
#[derive(Default)]
pub struct InMemoryTemplateRepository {
    templates: RwLock<HashMap<String, String>>,
}

impl InMemoryTemplateRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a template
    pub async fn insert(&self, structure_id: impl Into<String>, template: impl Into<String>) {
        self.templates.write().await.insert(structure_id.into(), template.into());
    }
}

#[async_trait]
impl TemplateRepository for InMemoryTemplateRepository {
    async fn find_template(&self, structure_id: &str) -> Result<Option<String>, CoreError> {
        Ok(self.templates.read().await.get(structure_id).cloned())
    }
}

/// Lookup tables for enrichment: table name -> key -> value
#[derive(Default)]
pub struct InMemoryLookupTables {
    tables: RwLock<HashMap<String, HashMap<String, Value>>>,
}

impl InMemoryLookupTables {
    /// Create an empty set of tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one row
    pub async fn insert(&self, table: impl Into<String>, key: impl Into<String>, value: Value) {
        self.tables
            .write()
            .await
            .entry(table.into())
            .or_default()
            .insert(key.into(), value);
    }

    /// Replace a whole table
    pub async fn load_table(&self, table: impl Into<String>, rows: HashMap<String, Value>) {
        self.tables.write().await.insert(table.into(), rows);
    }
}

#[async_trait]
impl LookupSource for InMemoryLookupTables {
    async fn lookup(&self, table: &str, key: &str) -> Result<Option<Value>, CoreError> {
        let tables = self.tables.read().await;
        Ok(tables.get(table).and_then(|rows| rows.get(key)).cloned())
    }
}
