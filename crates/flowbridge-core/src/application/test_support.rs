//! Shared fakes for application service tests

use crate::domain::adapter::{AdapterDescriptor, AdapterId};
use crate::domain::correlation::{CorrelationContext, CorrelationId, PayloadCapture, ProcessingEvent};
use crate::domain::execution::ExecutionRecord;
use crate::domain::flow::{FlowId, FlowStatus, IntegrationFlow};
use crate::domain::repository::{
    AdapterRepository, ExecutionRecorder, FieldMappingRepository, FlowRepository,
    TransformationRepository,
};
use crate::domain::transformation::{FieldMapping, StepId, TransformationStep};
use crate::{
    AdapterGateway, ConversionConfig, CoreError, FormatConverter, Payload, StepExecutor,
    StepExecutors, StepOutcome, TransformationPipeline,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::mock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

mock! {
    pub Gateway {}

    #[async_trait]
    impl AdapterGateway for Gateway {
        async fn fetch(&self, adapter: &AdapterDescriptor, ctx: &CorrelationContext) -> Result<Payload, CoreError>;
        async fn send(&self, adapter: &AdapterDescriptor, payload: &Payload, ctx: &CorrelationContext) -> Result<Payload, CoreError>;
    }
}

#[derive(Default)]
pub struct FakeFlows {
    pub flows: RwLock<HashMap<FlowId, IntegrationFlow>>,
}

impl FakeFlows {
    pub async fn insert(&self, flow: IntegrationFlow) {
        self.flows.write().await.insert(flow.id.clone(), flow);
    }

    pub async fn get(&self, id: &str) -> IntegrationFlow {
        self.flows.read().await[&FlowId::from(id)].clone()
    }
}

#[async_trait]
impl FlowRepository for FakeFlows {
    async fn find_by_id(&self, id: &FlowId) -> Result<Option<IntegrationFlow>, CoreError> {
        Ok(self.flows.read().await.get(id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<IntegrationFlow>, CoreError> {
        let mut flows: Vec<_> = self.flows.read().await.values().cloned().collect();
        flows.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(flows)
    }

    async fn save(&self, flow: &IntegrationFlow) -> Result<(), CoreError> {
        self.insert(flow.clone()).await;
        Ok(())
    }

    async fn save_if_status(
        &self,
        flow: &IntegrationFlow,
        expected: FlowStatus,
    ) -> Result<bool, CoreError> {
        let mut flows = self.flows.write().await;
        match flows.get(&flow.id) {
            Some(stored) if stored.status == expected => {
                flows.insert(flow.id.clone(), flow.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_execution(
        &self,
        id: &FlowId,
        success: bool,
        at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        if let Some(flow) = self.flows.write().await.get_mut(id) {
            flow.record_execution(success, at);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeAdapters {
    pub adapters: RwLock<HashMap<AdapterId, AdapterDescriptor>>,
}

impl FakeAdapters {
    pub async fn insert(&self, adapter: AdapterDescriptor) {
        self.adapters.write().await.insert(adapter.id.clone(), adapter);
    }
}

#[async_trait]
impl AdapterRepository for FakeAdapters {
    async fn find_by_id(&self, id: &AdapterId) -> Result<Option<AdapterDescriptor>, CoreError> {
        Ok(self.adapters.read().await.get(id).cloned())
    }

    async fn save(&self, adapter: &AdapterDescriptor) -> Result<(), CoreError> {
        self.insert(adapter.clone()).await;
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSteps {
    pub steps: RwLock<Vec<TransformationStep>>,
    pub mappings: RwLock<Vec<FieldMapping>>,
}

#[async_trait]
impl TransformationRepository for FakeSteps {
    async fn find_by_flow(&self, flow_id: &FlowId) -> Result<Vec<TransformationStep>, CoreError> {
        Ok(self
            .steps
            .read()
            .await
            .iter()
            .filter(|s| &s.flow_id == flow_id)
            .cloned()
            .collect())
    }

    async fn save(&self, step: &TransformationStep) -> Result<(), CoreError> {
        self.steps.write().await.push(step.clone());
        Ok(())
    }
}

#[async_trait]
impl FieldMappingRepository for FakeSteps {
    async fn find_by_step(&self, step_id: &StepId) -> Result<Vec<FieldMapping>, CoreError> {
        Ok(self
            .mappings
            .read()
            .await
            .iter()
            .filter(|m| &m.step_id == step_id)
            .cloned()
            .collect())
    }

    async fn save(&self, mapping: &FieldMapping) -> Result<(), CoreError> {
        self.mappings.write().await.push(mapping.clone());
        Ok(())
    }
}

/// Uppercases the payload
pub struct Shout;

#[async_trait]
impl StepExecutor for Shout {
    async fn apply(&self, _step: &TransformationStep, input: &str) -> Result<StepOutcome, CoreError> {
        Ok(StepOutcome::Continue(input.to_uppercase()))
    }
}

/// Drops everything
pub struct DropAll;

#[async_trait]
impl StepExecutor for DropAll {
    async fn apply(&self, _step: &TransformationStep, _input: &str) -> Result<StepOutcome, CoreError> {
        Ok(StepOutcome::Filtered {
            reason: "rejected by test filter".to_string(),
        })
    }
}

pub fn test_pipeline() -> TransformationPipeline {
    TransformationPipeline::new(StepExecutors {
        field_mapping: Arc::new(Shout),
        custom_function: Arc::new(Shout),
        filter: Arc::new(DropAll),
        enrichment: Arc::new(Shout),
        validation: Arc::new(Shout),
    })
}

/// Wraps text in `<xml>` on the way in and tags it with the target format on the way out
pub struct TaggingConverter;

impl FormatConverter for TaggingConverter {
    fn to_xml(&self, payload: &str, _source: &AdapterDescriptor) -> Result<String, CoreError> {
        Ok(format!("<xml>{}</xml>", payload))
    }

    fn from_xml(&self, xml: &str, config: &ConversionConfig) -> Result<String, CoreError> {
        Ok(format!("{:?}:{}", config.format, xml))
    }
}

#[derive(Default)]
pub struct CollectingRecorder {
    pub payloads: Mutex<Vec<PayloadCapture>>,
    pub events: Mutex<Vec<(CorrelationId, ProcessingEvent)>>,
    pub outcomes: Mutex<Vec<ExecutionRecord>>,
}

#[async_trait]
impl ExecutionRecorder for CollectingRecorder {
    async fn record_payload(&self, capture: PayloadCapture) -> Result<(), CoreError> {
        self.payloads.lock().unwrap().push(capture);
        Ok(())
    }

    async fn record_event(
        &self,
        correlation_id: &CorrelationId,
        event: ProcessingEvent,
    ) -> Result<(), CoreError> {
        self.events.lock().unwrap().push((correlation_id.clone(), event));
        Ok(())
    }

    async fn record_outcome(&self, record: ExecutionRecord) -> Result<(), CoreError> {
        self.outcomes.lock().unwrap().push(record);
        Ok(())
    }
}

/// Recorder whose every call fails
pub struct FailingRecorder;

#[async_trait]
impl ExecutionRecorder for FailingRecorder {
    async fn record_payload(&self, _capture: PayloadCapture) -> Result<(), CoreError> {
        Err(CoreError::StateStoreError("message log offline".to_string()))
    }

    async fn record_event(
        &self,
        _correlation_id: &CorrelationId,
        _event: ProcessingEvent,
    ) -> Result<(), CoreError> {
        Err(CoreError::StateStoreError("message log offline".to_string()))
    }

    async fn record_outcome(&self, _record: ExecutionRecord) -> Result<(), CoreError> {
        Err(CoreError::StateStoreError("message log offline".to_string()))
    }
}
