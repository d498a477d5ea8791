use crate::application::flow_execution_service::FlowExecutionService;
use crate::domain::adapter::{AdapterConfig, AdapterDescriptor, AdapterId, AdapterType};
use crate::domain::correlation::{CorrelationContext, Direction, PayloadKind};
use crate::domain::execution::{ExecutionReport, FlowOutcome};
use crate::domain::flow::IntegrationFlow;
use crate::domain::repository::{AdapterRepository, FlowRepository};
use crate::types::Payload;
use crate::xml::dom::{XmlDocument, XmlElement, XmlNode};
use crate::xml::soap;
use crate::CoreError;
use quick_xml::escape::escape;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// WSDL SOAP 1.1 binding namespace
pub const WSDL_SOAP11_NS: &str = "http://schemas.xmlsoap.org/wsdl/soap/";

/// WSDL SOAP 1.2 binding namespace
pub const WSDL_SOAP12_NS: &str = "http://schemas.xmlsoap.org/wsdl/soap12/";

/// Maps inbound SOAP and REST requests to deployed flows
pub struct IntegrationEndpointService {
    flow_repo: Arc<dyn FlowRepository>,
    adapter_repo: Arc<dyn AdapterRepository>,
    executor: FlowExecutionService,
}

impl IntegrationEndpointService {
    /// Create a new endpoint service
    pub fn new(
        flow_repo: Arc<dyn FlowRepository>,
        adapter_repo: Arc<dyn AdapterRepository>,
        executor: FlowExecutionService,
    ) -> Self {
        Self {
            flow_repo,
            adapter_repo,
            executor,
        }
    }

    /// Find the deployed flow serving `path`. An endpoint whose path equals
    /// the request path wins, then one ending with it, then one containing it.
    pub async fn find_deployed_flow(&self, path: &str) -> Result<IntegrationFlow, CoreError> {
        let wanted = normalize_path(path);
        if wanted == "/" {
            return Err(CoreError::NoDeployedFlow(path.to_string()));
        }

        let mut candidates: Vec<(u8, IntegrationFlow)> = self
            .flow_repo
            .find_all()
            .await?
            .into_iter()
            .filter(IntegrationFlow::is_deployed)
            .filter_map(|flow| {
                let endpoint = flow.deployment_endpoint.as_deref()?;
                let endpoint_path = endpoint_path(endpoint);
                let rank = if endpoint_path == wanted {
                    0
                } else if endpoint.ends_with(&wanted) {
                    1
                } else if endpoint.contains(&wanted) {
                    2
                } else {
                    return None;
                };
                Some((rank, flow))
            })
            .collect();

        candidates.sort_by(|(a, fa), (b, fb)| a.cmp(b).then_with(|| fa.id.cmp(&fb.id)));
        candidates
            .into_iter()
            .next()
            .map(|(_, flow)| flow)
            .ok_or_else(|| CoreError::NoDeployedFlow(path.to_string()))
    }

    /// Serve a SOAP request. The envelope is unwrapped unless the target also
    /// speaks SOAP; the result is wrapped unless it already is an envelope.
    pub async fn process_soap_request(
        &self,
        path: &str,
        envelope: &str,
        headers: BTreeMap<String, String>,
    ) -> Result<String, CoreError> {
        let flow = self.find_deployed_flow(path).await?;
        info!(flow_id = %flow.id, %path, "Processing SOAP request");
        let mut ctx = self.context("SOAP", headers);

        let (source, target) = self.adapters(&flow).await?;
        ctx.capture_payload(&source, PayloadKind::Request, Direction::Inbound, &Payload::text(envelope));

        let message = if target.adapter_type == AdapterType::Soap {
            envelope.to_string()
        } else {
            soap::unwrap(envelope).map_err(|err| CoreError::FlowExecutionError {
                flow: flow.name.clone(),
                source: Box::new(err),
            })?
        };

        let report = self
            .executor
            .process_message(&flow, Payload::text(message), &mut ctx)
            .await?;

        let result = match &report.outcome {
            FlowOutcome::Filtered { step, reason } => soap::filtered(step, reason),
            _ => response_text(&report),
        };
        let response = if soap::is_envelope_response(&result) {
            result
        } else {
            soap::wrap(&result)
        };
        ctx.capture_payload(&source, PayloadKind::Response, Direction::Outbound, &Payload::text(response.as_str()));
        debug!(flow_id = %flow.id, correlation_id = %ctx.id(), "SOAP request processed");
        Ok(response)
    }

    /// Serve a REST request. JSON objects and arrays are returned as-is; any
    /// other result is wrapped as `{"message": ...}`.
    pub async fn process_rest_request(
        &self,
        path: &str,
        method: &str,
        body: &str,
        headers: BTreeMap<String, String>,
    ) -> Result<Value, CoreError> {
        let flow = self.find_deployed_flow(path).await?;
        info!(flow_id = %flow.id, %path, %method, "Processing REST request");
        let mut ctx = self.context("REST", headers);

        let (source, _target) = self.adapters(&flow).await?;
        ctx.capture_payload(&source, PayloadKind::Request, Direction::Inbound, &Payload::text(body));

        let report = self
            .executor
            .process_message(&flow, Payload::text(body), &mut ctx)
            .await?;

        let result = response_text(&report);
        let response = match serde_json::from_str::<Value>(&result) {
            Ok(value @ (Value::Object(_) | Value::Array(_))) => value,
            _ => json!({ "message": result }),
        };
        ctx.capture_payload(&source, PayloadKind::Response, Direction::Outbound, &Payload::text(response.to_string()));
        Ok(response)
    }

    /// WSDL for a deployed SOAP flow. A stored WSDL is served with its
    /// `soap:address` locations pointed at the flow's endpoint; otherwise a
    /// basic document-literal WSDL is generated.
    pub async fn generate_wsdl(&self, path: &str) -> Result<String, CoreError> {
        let flow = self.find_deployed_flow(path).await?;
        let endpoint = flow.deployment_endpoint.clone().unwrap_or_default();
        let (source, _target) = self.adapters(&flow).await?;

        let stored = match source.typed_config()? {
            AdapterConfig::Soap(config) => config.wsdl_content.filter(|w| !w.trim().is_empty()),
            _ => None,
        };

        match stored {
            Some(wsdl) => {
                let mut doc = XmlDocument::parse(&wsdl)?;
                let rewritten = rewrite_addresses(&mut doc.root, &endpoint);
                debug!(flow_id = %flow.id, rewritten, "Serving stored WSDL");
                Ok(doc.to_xml_with_declaration())
            }
            None => Ok(basic_wsdl(&flow.name, &endpoint)),
        }
    }

    fn context(&self, protocol: &str, headers: BTreeMap<String, String>) -> CorrelationContext {
        let ctx = CorrelationContext::from_headers(protocol, headers).for_endpoint();
        match self.executor.recorder() {
            Some(recorder) => ctx.with_recorder(recorder),
            None => ctx,
        }
    }

    async fn adapters(
        &self,
        flow: &IntegrationFlow,
    ) -> Result<(AdapterDescriptor, AdapterDescriptor), CoreError> {
        Ok((
            self.load_adapter(&flow.source_adapter_id).await?,
            self.load_adapter(&flow.target_adapter_id).await?,
        ))
    }

    async fn load_adapter(&self, id: &AdapterId) -> Result<AdapterDescriptor, CoreError> {
        self.adapter_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Adapter", id.to_string()))
    }
}

fn response_text(report: &ExecutionReport) -> String {
    match &report.outcome {
        FlowOutcome::Filtered { step, reason } => {
            format!("Message filtered by step '{}': {}", step, reason)
        }
        outcome => outcome
            .response()
            .map(Payload::to_text_lossy)
            .unwrap_or_default(),
    }
}

fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

// `http://host:8080/soap/x` -> `/soap/x`
fn endpoint_path(endpoint: &str) -> String {
    let without_scheme = endpoint
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(endpoint);
    match without_scheme.find('/') {
        Some(index) => normalize_path(&without_scheme[index..]),
        None => "/".to_string(),
    }
}

fn rewrite_addresses(element: &mut XmlElement, endpoint: &str) -> usize {
    let mut count = 0;
    if element.local_name() == "address"
        && matches!(element.namespace.as_deref(), Some(WSDL_SOAP11_NS | WSDL_SOAP12_NS))
    {
        element.set_attribute("location", endpoint);
        count += 1;
    }
    for child in element.children.iter_mut() {
        if let XmlNode::Element(child) = child {
            count += rewrite_addresses(child, endpoint);
        }
    }
    count
}

fn basic_wsdl(flow_name: &str, endpoint: &str) -> String {
    let service: String = flow_name.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    let namespace = format!("http://integrixflowbridge.com/{}", service);
    let location = escape(endpoint);

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<definitions xmlns="http://schemas.xmlsoap.org/wsdl/"
             xmlns:soap="http://schemas.xmlsoap.org/wsdl/soap/"
             xmlns:tns="{ns}"
             xmlns:xsd="http://www.w3.org/2001/XMLSchema"
             name="{svc}"
             targetNamespace="{ns}">
  <types>
    <xsd:schema targetNamespace="{ns}" elementFormDefault="qualified">
      <xsd:element name="{svc}Request" type="xsd:anyType"/>
      <xsd:element name="{svc}Response" type="xsd:anyType"/>
    </xsd:schema>
  </types>
  <message name="{svc}RequestMessage">
    <part name="parameters" element="tns:{svc}Request"/>
  </message>
  <message name="{svc}ResponseMessage">
    <part name="parameters" element="tns:{svc}Response"/>
  </message>
  <portType name="{svc}PortType">
    <operation name="process">
      <input message="tns:{svc}RequestMessage"/>
      <output message="tns:{svc}ResponseMessage"/>
    </operation>
  </portType>
  <binding name="{svc}Binding" type="tns:{svc}PortType">
    <soap:binding style="document" transport="http://schemas.xmlsoap.org/soap/http"/>
    <operation name="process">
      <soap:operation soapAction="{ns}/process"/>
      <input><soap:body use="literal"/></input>
      <output><soap:body use="literal"/></output>
    </operation>
  </binding>
  <service name="{svc}Service">
    <port name="{svc}Port" binding="tns:{svc}Binding">
      <soap:address location="{loc}"/>
    </port>
  </service>
</definitions>
"#,
        ns = namespace,
        svc = service,
        loc = location
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::*;
    use crate::domain::adapter::AdapterMode;
    use crate::domain::deployment::DeploymentMetadata;
    use crate::domain::flow::{FlowId, MappingMode};
    use crate::domain::transformation::{TransformationKind, TransformationStep};
    use crate::xml::select_first_value;
    use serde_json::json;

    struct Fixture {
        flows: Arc<FakeFlows>,
        adapters: Arc<FakeAdapters>,
    }

    async fn deployed(flows: &FakeFlows, id: &str, name: &str, endpoint: &str, target: &str) {
        let mut flow = IntegrationFlow::new(
            FlowId::from(id),
            name,
            AdapterId::from("soap-in"),
            AdapterId::from(target),
        );
        flow.mark_deployed(endpoint.to_string(), DeploymentMetadata::default(), "test")
            .unwrap();
        flows.insert(flow).await;
    }

    async fn fixture() -> Fixture {
        let flows = Arc::new(FakeFlows::default());
        let adapters = Arc::new(FakeAdapters::default());
        adapters
            .insert(AdapterDescriptor::new("soap-in", "Quotes In", AdapterType::Soap, AdapterMode::Sender))
            .await;
        adapters
            .insert(
                AdapterDescriptor::new("rest-out", "Quotes Api", AdapterType::Rest, AdapterMode::Receiver)
                    .with_config(json!({ "endpoint": "http://backend/quotes" })),
            )
            .await;
        adapters
            .insert(
                AdapterDescriptor::new("soap-out", "Legacy", AdapterType::Soap, AdapterMode::Receiver)
                    .with_config(json!({ "targetEndpointUrl": "http://legacy/ws" })),
            )
            .await;
        deployed(&flows, "f1", "Get Quote", "http://localhost:8080/soap/get-quote", "rest-out").await;
        Fixture { flows, adapters }
    }

    fn service(fixture: &Fixture, gateway: MockGateway) -> IntegrationEndpointService {
        let executor = FlowExecutionService::new(
            fixture.flows.clone(),
            fixture.adapters.clone(),
            Arc::new(FakeSteps::default()),
            Arc::new(FakeSteps::default()),
            Arc::new(gateway),
            Arc::new(test_pipeline()),
            Arc::new(TaggingConverter),
        );
        IntegrationEndpointService::new(fixture.flows.clone(), fixture.adapters.clone(), executor)
    }

    #[tokio::test]
    async fn test_soap_request_is_unwrapped_and_response_wrapped() {
        let fixture = fixture().await;
        let mut gateway = MockGateway::new();
        gateway
            .expect_send()
            .withf(|_, payload, _| payload.as_text() == Some("<r><v>5</v></r>"))
            .times(1)
            .returning(|_, _, _| Ok(Payload::text("<ok>1</ok>")));
        let service = service(&fixture, gateway);

        let response = service
            .process_soap_request("/soap/get-quote", &soap::wrap("<r><v>5</v></r>"), BTreeMap::new())
            .await
            .unwrap();

        assert_eq!(response, soap::wrap("<ok>1</ok>"));
        assert_eq!(soap::unwrap(&response).unwrap(), "<ok>1</ok>");
    }

    #[tokio::test]
    async fn test_soap_to_soap_keeps_envelope() {
        let fixture = fixture().await;
        deployed(&fixture.flows, "f2", "Legacy Bridge", "http://localhost:8080/soap/legacy", "soap-out").await;
        let envelope = soap::wrap("<a/>");
        let expected = envelope.clone();
        let reply = soap::wrap("<b/>");
        let reply_clone = reply.clone();

        let mut gateway = MockGateway::new();
        gateway
            .expect_send()
            .withf(move |_, payload, _| payload.as_text() == Some(expected.as_str()))
            .times(1)
            .returning(move |_, _, _| Ok(Payload::text(reply_clone.clone())));
        let service = service(&fixture, gateway);

        let response = service
            .process_soap_request("/soap/legacy", &envelope, BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(response, reply);
    }

    #[tokio::test]
    async fn test_filtered_soap_call_answers_with_element() {
        let fixture = fixture().await;
        let steps = Arc::new(FakeSteps::default());
        steps.steps.write().await.push(TransformationStep::new(
            "drop-quotes",
            FlowId::from("f3"),
            TransformationKind::Filter,
            1,
        ));
        let mut flow = IntegrationFlow::new(
            FlowId::from("f3"),
            "Filtered Quote",
            AdapterId::from("soap-in"),
            AdapterId::from("rest-out"),
        )
        .with_mapping_mode(MappingMode::WithMapping);
        flow.mark_deployed(
            "http://localhost:8080/soap/filtered-quote".to_string(),
            DeploymentMetadata::default(),
            "test",
        )
        .unwrap();
        fixture.flows.insert(flow).await;

        let mut gateway = MockGateway::new();
        gateway.expect_send().times(0);
        let executor = FlowExecutionService::new(
            fixture.flows.clone(),
            fixture.adapters.clone(),
            steps.clone(),
            steps,
            Arc::new(gateway),
            Arc::new(test_pipeline()),
            Arc::new(TaggingConverter),
        );
        let service =
            IntegrationEndpointService::new(fixture.flows.clone(), fixture.adapters.clone(), executor);

        let response = service
            .process_soap_request("/soap/filtered-quote", &soap::wrap("<r/>"), BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(
            soap::unwrap(&response).unwrap(),
            "<filtered step=\"drop-quotes\">rejected by test filter</filtered>"
        );
    }

    #[tokio::test]
    async fn test_malformed_envelope() {
        let fixture = fixture().await;
        let mut gateway = MockGateway::new();
        gateway.expect_send().times(0);
        let service = service(&fixture, gateway);

        let err = service
            .process_soap_request("/soap/get-quote", "<r>no envelope</r>", BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err.root_cause(), CoreError::MalformedEnvelope(_)));
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let fixture = fixture().await;
        let service = service(&fixture, MockGateway::new());
        let err = service
            .process_soap_request("/soap/nothing-here", "<x/>", BTreeMap::new())
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::NoDeployedFlow("/soap/nothing-here".to_string()));
    }

    #[tokio::test]
    async fn test_exact_path_beats_partial_match() {
        let fixture = fixture().await;
        deployed(&fixture.flows, "a0", "Quote", "http://localhost:8080/soap/get-quote-v2", "rest-out").await;
        let service = service(&fixture, MockGateway::new());

        let flow = service.find_deployed_flow("/soap/get-quote").await.unwrap();
        assert_eq!(flow.id, FlowId::from("f1"));
        let flow = service.find_deployed_flow("get-quote-v2").await.unwrap();
        assert_eq!(flow.id, FlowId::from("a0"));
    }

    #[tokio::test]
    async fn test_undeployed_flow_is_not_routed() {
        let fixture = fixture().await;
        let mut flow = fixture.flows.get("f1").await;
        flow.mark_undeployed().unwrap();
        fixture.flows.insert(flow).await;
        let service = service(&fixture, MockGateway::new());

        assert!(matches!(
            service.find_deployed_flow("/soap/get-quote").await,
            Err(CoreError::NoDeployedFlow(_))
        ));
    }

    #[tokio::test]
    async fn test_rest_response_shaping() {
        let fixture = fixture().await;
        deployed(&fixture.flows, "r1", "Quotes", "http://localhost:8080/api/integration/quotes", "rest-out").await;
        let mut gateway = MockGateway::new();
        let mut replies = vec![Payload::text("plain text"), Payload::text("[1,2]")];
        gateway
            .expect_send()
            .times(2)
            .returning(move |_, _, _| Ok(replies.pop().unwrap_or_else(|| Payload::text(""))));
        let service = service(&fixture, gateway);

        let first = service
            .process_rest_request("/api/integration/quotes", "POST", "{}", BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(first, json!([1, 2]));
        let second = service
            .process_rest_request("/api/integration/quotes", "POST", "{}", BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(second, json!({ "message": "plain text" }));
    }

    #[tokio::test]
    async fn test_generated_wsdl() {
        let fixture = fixture().await;
        let service = service(&fixture, MockGateway::new());

        let wsdl = service.generate_wsdl("/soap/get-quote").await.unwrap();
        let doc = XmlDocument::parse(&wsdl).unwrap();
        assert_eq!(doc.root.attribute("targetNamespace"), Some("http://integrixflowbridge.com/GetQuote"));
        assert_eq!(
            select_first_value(&doc, None, "//service/port/address/@location").unwrap().as_deref(),
            Some("http://localhost:8080/soap/get-quote")
        );
    }

    #[tokio::test]
    async fn test_stored_wsdl_address_is_rewritten() {
        let fixture = fixture().await;
        let stored = r#"<wsdl:definitions xmlns:wsdl="http://schemas.xmlsoap.org/wsdl/" xmlns:soap12="http://schemas.xmlsoap.org/wsdl/soap12/"><wsdl:service name="Q"><wsdl:port name="P"><soap12:address location="http://old-host/ws"/></wsdl:port></wsdl:service></wsdl:definitions>"#;
        fixture
            .adapters
            .insert(
                AdapterDescriptor::new("soap-in", "Quotes In", AdapterType::Soap, AdapterMode::Sender)
                    .with_config(json!({ "wsdlContent": stored })),
            )
            .await;
        let service = service(&fixture, MockGateway::new());

        let wsdl = service.generate_wsdl("/soap/get-quote").await.unwrap();
        assert!(wsdl.contains(r#"location="http://localhost:8080/soap/get-quote""#));
        assert!(!wsdl.contains("old-host"));
    }

    #[test]
    fn test_endpoint_path() {
        assert_eq!(endpoint_path("http://localhost:8080/soap/x/"), "/soap/x");
        assert_eq!(endpoint_path("file:///opt/flows/x"), "/opt/flows/x");
        assert_eq!(normalize_path("soap/x?wsdl"), "/soap/x");
    }
}
