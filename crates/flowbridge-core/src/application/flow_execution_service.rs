use crate::application::transformation_pipeline::{PipelineOutcome, TransformationPipeline};
use crate::domain::adapter::{AdapterDescriptor, AdapterId};
use crate::domain::conversion::ConversionConfig;
use crate::domain::correlation::CorrelationContext;
use crate::domain::execution::{
    ExecutionRecord, ExecutionReport, ExecutionState, FlowExecution, FlowOutcome,
};
use crate::domain::flow::{FlowId, IntegrationFlow, MappingMode};
use crate::domain::repository::{
    AdapterRepository, ExecutionRecorder, FieldMappingRepository, FlowRepository,
    TransformationRepository,
};
use crate::domain::transformation::{
    ordered_active_mappings, ordered_active_steps, TransformationKind, TransformationStep,
};
use crate::types::{LogLevel, Payload};
use crate::{AdapterGateway, CoreError, FormatConverter};
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Where the inbound message comes from
enum Inbound {
    /// Pull it from the source adapter
    Fetch,
    /// Handed over by a published endpoint
    Message(Payload),
}

#[derive(Default)]
struct Sizes {
    input: usize,
    output: usize,
}

/// Service for executing flows
///
/// Drives one message from source to target: resolve and check adapters,
/// convert to XML, run the transformation pipeline, convert to the target's
/// native format and deliver. Each execution is independent; all
/// per-execution state lives in the [`CorrelationContext`].
#[derive(Clone)]
pub struct FlowExecutionService {
    flow_repo: Arc<dyn FlowRepository>,
    adapter_repo: Arc<dyn AdapterRepository>,
    transformation_repo: Arc<dyn TransformationRepository>,
    mapping_repo: Arc<dyn FieldMappingRepository>,
    gateway: Arc<dyn AdapterGateway>,
    pipeline: Arc<TransformationPipeline>,
    converter: Arc<dyn FormatConverter>,
    recorder: Option<Arc<dyn ExecutionRecorder>>,
}

impl FlowExecutionService {
    /// Create a new flow execution service
    pub fn new(
        flow_repo: Arc<dyn FlowRepository>,
        adapter_repo: Arc<dyn AdapterRepository>,
        transformation_repo: Arc<dyn TransformationRepository>,
        mapping_repo: Arc<dyn FieldMappingRepository>,
        gateway: Arc<dyn AdapterGateway>,
        pipeline: Arc<TransformationPipeline>,
        converter: Arc<dyn FormatConverter>,
    ) -> Self {
        Self {
            flow_repo,
            adapter_repo,
            transformation_repo,
            mapping_repo,
            gateway,
            pipeline,
            converter,
            recorder: None,
        }
    }

    /// Builder: attach the message log that receives captures and outcomes
    pub fn with_recorder(mut self, recorder: Arc<dyn ExecutionRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Recorder attached to this service, if any
    pub fn recorder(&self) -> Option<Arc<dyn ExecutionRecorder>> {
        self.recorder.clone()
    }

    /// Run a flow once, pulling the message from its source adapter
    pub async fn execute_flow(&self, flow_id: &FlowId) -> Result<ExecutionReport, CoreError> {
        let flow = self
            .flow_repo
            .find_by_id(flow_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Flow", flow_id.to_string()))?;

        let mut ctx = CorrelationContext::new("INTERNAL");
        if let Some(recorder) = &self.recorder {
            ctx = ctx.with_recorder(recorder.clone());
        }
        ctx.bind_flow(&flow);

        self.run(&flow, Inbound::Fetch, &ctx).await
    }

    /// Fire-and-forget execution; the outcome is only logged
    pub fn spawn_flow(&self, flow_id: FlowId) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            match service.execute_flow(&flow_id).await {
                Ok(report) => {
                    info!(%flow_id, correlation_id = %report.correlation_id, duration_ms = report.duration_ms, "Flow execution finished");
                }
                Err(err) => {
                    error!(%flow_id, error = %err, "Flow execution failed");
                }
            }
        })
    }

    /// Run a flow on a message received by a published endpoint. The caller
    /// owns the context so it can read captures after the run.
    pub async fn process_message(
        &self,
        flow: &IntegrationFlow,
        message: Payload,
        ctx: &mut CorrelationContext,
    ) -> Result<ExecutionReport, CoreError> {
        ctx.bind_flow(flow);
        self.run(flow, Inbound::Message(message), ctx).await
    }

    async fn run(
        &self,
        flow: &IntegrationFlow,
        inbound: Inbound,
        ctx: &CorrelationContext,
    ) -> Result<ExecutionReport, CoreError> {
        let mut execution = FlowExecution::start();
        let mut sizes = Sizes::default();
        info!(flow_id = %flow.id, correlation_id = %ctx.id(), "Starting flow execution");
        ctx.record_step(
            LogLevel::Info,
            format!("Starting execution of flow '{}'", flow.name),
        );

        let result = self
            .execute_stages(flow, inbound, ctx, &mut execution, &mut sizes)
            .await;

        match &result {
            Ok(outcome) => {
                let message = match outcome {
                    FlowOutcome::Filtered { step, .. } => {
                        format!("Message filtered by step '{}'", step)
                    }
                    _ => format!("Flow '{}' completed", flow.name),
                };
                ctx.record_step(LogLevel::Info, message);
            }
            Err(err) => {
                execution.fail();
                error!(flow_id = %flow.id, correlation_id = %ctx.id(), error = %err, "Flow execution failed");
                ctx.record_step(
                    LogLevel::Error,
                    format!("Flow '{}' failed: {}", flow.name, err.root_cause()),
                );
            }
        }

        if let Err(err) = self
            .flow_repo
            .record_execution(&flow.id, result.is_ok(), Utc::now())
            .await
        {
            warn!(flow_id = %flow.id, error = %err, "Failed to update execution counters");
        }

        let duration_ms = execution.elapsed_ms();
        ctx.record_outcome(ExecutionRecord {
            correlation_id: ctx.id().clone(),
            flow_id: flow.id.clone(),
            flow_name: flow.name.clone(),
            state: execution.state(),
            input_size: sizes.input,
            output_size: sizes.output,
            duration_ms,
            error: result.as_ref().err().map(ToString::to_string),
            root_cause: result.as_ref().err().map(|e| e.root_cause().to_string()),
            finished_at: Utc::now(),
        });

        match result {
            Ok(outcome) => Ok(ExecutionReport {
                correlation_id: ctx.id().clone(),
                flow_id: flow.id.clone(),
                outcome,
                states: execution.visited().to_vec(),
                input_size: sizes.input,
                output_size: sizes.output,
                duration_ms,
                events: ctx.events(),
            }),
            Err(err) => Err(CoreError::FlowExecutionError {
                flow: flow.name.clone(),
                source: Box::new(err),
            }),
        }
    }

    async fn execute_stages(
        &self,
        flow: &IntegrationFlow,
        inbound: Inbound,
        ctx: &CorrelationContext,
        execution: &mut FlowExecution,
        sizes: &mut Sizes,
    ) -> Result<FlowOutcome, CoreError> {
        execution.advance(ExecutionState::ValidatingSource)?;
        let source = self.load_adapter(&flow.source_adapter_id).await?;
        let target = self.load_adapter(&flow.target_adapter_id).await?;
        ensure_active(&source, "Source")?;
        ensure_active(&target, "Target")?;
        ctx.record_step(
            LogLevel::Info,
            format!(
                "Resolved source adapter '{}' ({}) and target adapter '{}' ({})",
                source.name, source.adapter_type, target.name, target.adapter_type
            ),
        );

        let payload = match inbound {
            Inbound::Fetch => self.gateway.fetch(&source, ctx).await?,
            Inbound::Message(message) => message,
        };
        sizes.input = payload.len();

        if flow.skip_xml_conversion || payload.is_binary() {
            return self
                .direct_transfer(&target, payload, ctx, execution, sizes)
                .await;
        }

        let output = match flow.mapping_mode {
            MappingMode::WithMapping => {
                execution.advance(ExecutionState::Transforming)?;
                let text = payload.to_text_lossy();
                let xml = self.converter.to_xml(&text, &source)?;
                debug!(flow_id = %flow.id, bytes = xml.len(), "Converted source payload to XML");

                let steps = self.transformation_repo.find_by_flow(&flow.id).await?;
                match self.pipeline.apply(&steps, xml, Some(ctx)).await? {
                    PipelineOutcome::Filtered { step, reason } => {
                        execution.advance(ExecutionState::Completed)?;
                        return Ok(FlowOutcome::Filtered { step, reason });
                    }
                    PipelineOutcome::Completed(xml) => {
                        let config = ConversionConfig::for_target(&target)?
                            .with_field_mappings(self.conversion_mappings(&steps).await?);
                        Payload::Text(self.converter.from_xml(&xml, &config)?)
                    }
                }
            }
            MappingMode::PassThrough => {
                execution.advance(ExecutionState::Passthrough)?;
                ctx.record_step(LogLevel::Info, "Pass-through: payload forwarded unchanged");
                payload
            }
        };
        sizes.output = output.len();

        execution.advance(ExecutionState::Sending)?;
        let response = self.gateway.send(&target, &output, ctx).await?;
        execution.advance(ExecutionState::Completed)?;

        Ok(FlowOutcome::Delivered {
            response: non_empty(response),
        })
    }

    async fn direct_transfer(
        &self,
        target: &AdapterDescriptor,
        payload: Payload,
        ctx: &CorrelationContext,
        execution: &mut FlowExecution,
        sizes: &mut Sizes,
    ) -> Result<FlowOutcome, CoreError> {
        execution.advance(ExecutionState::Passthrough)?;
        execution.advance(ExecutionState::Sending)?;
        let bytes = payload.len();
        sizes.output = bytes;
        ctx.record_step(
            LogLevel::Info,
            format!("Direct transfer of {} bytes to '{}'", bytes, target.name),
        );

        let response = self.gateway.send(target, &payload, ctx).await?;
        execution.advance(ExecutionState::Completed)?;
        Ok(FlowOutcome::DirectTransfer {
            bytes,
            response: non_empty(response),
        })
    }

    async fn load_adapter(&self, id: &AdapterId) -> Result<AdapterDescriptor, CoreError> {
        self.adapter_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Adapter", id.to_string()))
    }

    // Renames applied by flat-file converters: first source element to
    // target element, taken from the flow's FIELD_MAPPING steps.
    async fn conversion_mappings(
        &self,
        steps: &[TransformationStep],
    ) -> Result<Vec<(String, String)>, CoreError> {
        let mut renames = Vec::new();
        for step in ordered_active_steps(steps)
            .into_iter()
            .filter(|s| s.kind == TransformationKind::FieldMapping)
        {
            let mappings = self.mapping_repo.find_by_step(&step.id).await?;
            for mapping in ordered_active_mappings(&mappings) {
                if let Some(source) = mapping.sources().first() {
                    renames.push((leaf_name(source), leaf_name(mapping.target())));
                }
            }
        }
        Ok(renames)
    }
}

fn ensure_active(adapter: &AdapterDescriptor, role: &str) -> Result<(), CoreError> {
    if adapter.active {
        Ok(())
    } else {
        Err(CoreError::AdapterInactive {
            role: role.to_string(),
            adapter: adapter.name.clone(),
        })
    }
}

fn non_empty(payload: Payload) -> Option<Payload> {
    if payload.is_empty() {
        None
    } else {
        Some(payload)
    }
}

// `/Req/Amount` -> `Amount`, `ns:Total` -> `Total`
fn leaf_name(path: &str) -> String {
    let leaf = path.rsplit('/').next().unwrap_or(path);
    let leaf = leaf.split('[').next().unwrap_or(leaf);
    leaf.rsplit(':').next().unwrap_or(leaf).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::*;
    use crate::domain::adapter::{AdapterMode, AdapterType};
    use crate::domain::transformation::FieldMapping;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Fixture {
        flows: Arc<FakeFlows>,
        adapters: Arc<FakeAdapters>,
        steps: Arc<FakeSteps>,
        recorder: Arc<CollectingRecorder>,
    }

    impl Fixture {
        async fn new(flow: IntegrationFlow, source_active: bool) -> Self {
            let fixture = Self {
                flows: Arc::new(FakeFlows::default()),
                adapters: Arc::new(FakeAdapters::default()),
                steps: Arc::new(FakeSteps::default()),
                recorder: Arc::new(CollectingRecorder::default()),
            };
            fixture.flows.insert(flow).await;
            fixture
                .adapters
                .insert(
                    AdapterDescriptor::new("src", "Orders In", AdapterType::Soap, AdapterMode::Sender)
                        .with_active(source_active),
                )
                .await;
            fixture
                .adapters
                .insert(
                    AdapterDescriptor::new("dst", "Orders Out", AdapterType::Http, AdapterMode::Receiver)
                        .with_config(json!({ "endpoint": "http://backend/orders" })),
                )
                .await;
            fixture
        }

        fn service(&self, gateway: MockGateway) -> FlowExecutionService {
            FlowExecutionService::new(
                self.flows.clone(),
                self.adapters.clone(),
                self.steps.clone(),
                self.steps.clone(),
                Arc::new(gateway),
                Arc::new(test_pipeline()),
                Arc::new(TaggingConverter),
            )
            .with_recorder(self.recorder.clone())
        }
    }

    fn flow() -> IntegrationFlow {
        IntegrationFlow::new(FlowId::from("f1"), "Orders", AdapterId::from("src"), AdapterId::from("dst"))
    }

    #[tokio::test]
    async fn test_pass_through_delivers_unchanged_payload() {
        let fixture = Fixture::new(flow(), true).await;
        let mut gateway = MockGateway::new();
        gateway.expect_fetch().times(0);
        gateway
            .expect_send()
            .withf(|adapter, payload, _| adapter.name == "Orders Out" && payload.as_text() == Some("<r><v>5</v></r>"))
            .times(1)
            .returning(|_, _, _| Ok(Payload::text("{\"ok\":true}")));
        let service = fixture.service(gateway);

        let flow = fixture.flows.get("f1").await;
        let mut ctx = CorrelationContext::new("SOAP");
        let report = service
            .process_message(&flow, Payload::text("<r><v>5</v></r>"), &mut ctx)
            .await
            .unwrap();

        assert_eq!(
            report.states,
            vec![
                ExecutionState::Started,
                ExecutionState::ValidatingSource,
                ExecutionState::Passthrough,
                ExecutionState::Sending,
                ExecutionState::Completed,
            ]
        );
        assert_eq!(report.outcome.response(), Some(&Payload::text("{\"ok\":true}")));
        assert_eq!(report.input_size, report.output_size);

        let stored = fixture.flows.get("f1").await;
        assert_eq!(stored.execution_count, 1);
        assert_eq!(stored.success_count, 1);
    }

    #[tokio::test]
    async fn test_inactive_source_fails_before_any_io() {
        let fixture = Fixture::new(flow(), false).await;
        let mut gateway = MockGateway::new();
        gateway.expect_fetch().times(0);
        gateway.expect_send().times(0);
        let service = fixture.service(gateway);

        let err = service.execute_flow(&FlowId::from("f1")).await.unwrap_err();
        assert!(matches!(err, CoreError::FlowExecutionError { .. }));
        assert_eq!(
            err.root_cause(),
            &CoreError::AdapterInactive {
                role: "Source".to_string(),
                adapter: "Orders In".to_string()
            }
        );
        assert!(err.to_string().starts_with("Flow processing failed for 'Orders'"));

        let stored = fixture.flows.get("f1").await;
        assert_eq!(stored.error_count, 1);
    }

    #[tokio::test]
    async fn test_inactive_target_fails_before_any_io() {
        let fixture = Fixture::new(flow(), true).await;
        fixture
            .adapters
            .insert(
                AdapterDescriptor::new("dst", "Orders Out", AdapterType::Http, AdapterMode::Receiver)
                    .with_active(false),
            )
            .await;
        let mut gateway = MockGateway::new();
        gateway.expect_fetch().times(0);
        gateway.expect_send().times(0);
        let service = fixture.service(gateway);

        let err = service.execute_flow(&FlowId::from("f1")).await.unwrap_err();
        assert_eq!(
            err.root_cause(),
            &CoreError::AdapterInactive {
                role: "Target".to_string(),
                adapter: "Orders Out".to_string()
            }
        );
        assert_eq!(fixture.flows.get("f1").await.error_count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failing_recorder_does_not_change_outcome() {
        let fixture = Fixture::new(flow(), true).await;
        let mut gateway = MockGateway::new();
        gateway
            .expect_send()
            .times(1)
            .returning(|_, _, _| Ok(Payload::text("accepted")));
        let service = fixture.service(gateway).with_recorder(Arc::new(FailingRecorder));

        let flow = fixture.flows.get("f1").await;
        let mut ctx = CorrelationContext::new("REST").with_recorder(Arc::new(FailingRecorder));
        let report = service
            .process_message(&flow, Payload::text("<a/>"), &mut ctx)
            .await
            .unwrap();
        ctx.flush().await;

        assert_eq!(report.outcome.response(), Some(&Payload::text("accepted")));
        assert_eq!(report.states.last(), Some(&ExecutionState::Completed));
        let stored = fixture.flows.get("f1").await;
        assert_eq!(stored.success_count, 1);
        assert_eq!(stored.error_count, 0);
    }

    #[tokio::test]
    async fn test_with_mapping_converts_and_transforms() {
        let fixture = Fixture::new(flow().with_mapping_mode(MappingMode::WithMapping), true).await;
        fixture.steps.steps.write().await.push(TransformationStep::new(
            "s1",
            FlowId::from("f1"),
            TransformationKind::FieldMapping,
            1,
        ));
        fixture.steps.mappings.write().await.push(FieldMapping::new(
            "m1",
            crate::domain::transformation::StepId::from("s1"),
            "/Req/Amount",
            "/Out/Total",
        ));

        let mut gateway = MockGateway::new();
        gateway
            .expect_send()
            .withf(|_, payload, _| payload.as_text() == Some("Json:<XML>A</XML>"))
            .times(1)
            .returning(|_, _, _| Ok(Payload::text("")));
        let service = fixture.service(gateway);

        let flow = fixture.flows.get("f1").await;
        let mut ctx = CorrelationContext::new("SOAP");
        let report = service
            .process_message(&flow, Payload::text("a"), &mut ctx)
            .await
            .unwrap();

        assert!(report.states.contains(&ExecutionState::Transforming));
        assert_eq!(report.outcome, FlowOutcome::Delivered { response: None });
        assert_eq!(
            service.conversion_mappings(&fixture.steps.steps.read().await).await.unwrap(),
            vec![("Amount".to_string(), "Total".to_string())]
        );
    }

    #[tokio::test]
    async fn test_filtered_message_is_not_sent() {
        let fixture = Fixture::new(flow().with_mapping_mode(MappingMode::WithMapping), true).await;
        fixture.steps.steps.write().await.push(TransformationStep::new(
            "only-active",
            FlowId::from("f1"),
            TransformationKind::Filter,
            1,
        ));
        let mut gateway = MockGateway::new();
        gateway.expect_send().times(0);
        let service = fixture.service(gateway);

        let flow = fixture.flows.get("f1").await;
        let mut ctx = CorrelationContext::new("REST");
        let report = service
            .process_message(&flow, Payload::text("x"), &mut ctx)
            .await
            .unwrap();

        assert!(report.outcome.is_filtered());
        assert_eq!(report.states.last(), Some(&ExecutionState::Completed));
        assert_eq!(fixture.flows.get("f1").await.success_count, 1);
    }

    #[tokio::test]
    async fn test_binary_payload_bypasses_conversion() {
        let fixture = Fixture::new(flow().with_mapping_mode(MappingMode::WithMapping), true).await;
        let bytes = vec![0x89, 0x50, 0x4e, 0x47, 0x00, 0xff];
        let expected = bytes.clone();

        let mut gateway = MockGateway::new();
        gateway
            .expect_fetch()
            .times(1)
            .returning(move |_, _| Ok(Payload::from_bytes(bytes.clone())));
        gateway
            .expect_send()
            .withf(move |_, payload, _| payload.as_bytes() == expected.as_slice())
            .times(1)
            .returning(|_, _, _| Ok(Payload::text("")));
        let service = fixture.service(gateway);

        let report = service.execute_flow(&FlowId::from("f1")).await.unwrap();
        assert_eq!(report.outcome, FlowOutcome::DirectTransfer { bytes: 6, response: None });
        assert!(!report.states.contains(&ExecutionState::Transforming));
    }

    #[tokio::test]
    async fn test_skip_conversion_forwards_text_verbatim() {
        let fixture = Fixture::new(
            flow()
                .with_mapping_mode(MappingMode::WithMapping)
                .with_skip_xml_conversion(true),
            true,
        )
        .await;
        let mut gateway = MockGateway::new();
        gateway
            .expect_send()
            .withf(|_, payload, _| payload.as_text() == Some("a,b\n1,2\n"))
            .times(1)
            .returning(|_, _, _| Ok(Payload::text("done")));
        let service = fixture.service(gateway);

        let flow = fixture.flows.get("f1").await;
        let mut ctx = CorrelationContext::new("FILE");
        let report = service
            .process_message(&flow, Payload::text("a,b\n1,2\n"), &mut ctx)
            .await
            .unwrap();
        assert!(matches!(report.outcome, FlowOutcome::DirectTransfer { bytes: 8, .. }));
    }

    #[tokio::test]
    async fn test_target_failure_is_recorded() {
        let fixture = Fixture::new(flow(), true).await;
        let mut gateway = MockGateway::new();
        gateway.expect_send().returning(|_, _, _| {
            Err(CoreError::AdapterExecutionError {
                endpoint: "http://backend/orders".to_string(),
                protocol: "HTTP".to_string(),
                cause: "connection refused".to_string(),
            })
        });
        let service = fixture.service(gateway);

        let flow = fixture.flows.get("f1").await;
        let mut ctx = CorrelationContext::new("SOAP").with_recorder(fixture.recorder.clone());
        let err = service
            .process_message(&flow, Payload::text("<a/>"), &mut ctx)
            .await
            .unwrap_err();
        ctx.flush().await;

        assert!(matches!(err.root_cause(), CoreError::AdapterExecutionError { .. }));
        let outcomes = fixture.recorder.outcomes.lock().unwrap().clone();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].state, ExecutionState::Failed);
        assert!(outcomes[0].root_cause.as_deref().unwrap().contains("connection refused"));
        assert!(ctx.events().iter().any(|e| e.level == LogLevel::Error));
    }

    #[tokio::test]
    async fn test_unknown_flow() {
        let fixture = Fixture::new(flow(), true).await;
        let service = fixture.service(MockGateway::new());
        let err = service.execute_flow(&FlowId::from("nope")).await.unwrap_err();
        assert_eq!(err, CoreError::not_found("Flow", "nope"));
    }

    #[test]
    fn test_leaf_name() {
        assert_eq!(leaf_name("/Req/Amount"), "Amount");
        assert_eq!(leaf_name("ns:Total"), "Total");
        assert_eq!(leaf_name("/a/b[2]"), "b");
        assert_eq!(leaf_name("plain"), "plain");
    }
}
