use crate::domain::adapter::AdapterDescriptor;
use crate::domain::execution::ExecutionRecord;
use crate::domain::flow::{FlowId, IntegrationFlow};
use crate::domain::repository::ExecutionRecorder;
use crate::types::{LogLevel, Payload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Header carrying a caller supplied correlation id
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Value object: Correlation ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    /// Fresh random id
    pub fn generate() -> Self {
        CorrelationId(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Direction of a captured payload relative to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Data entering the engine
    Inbound,
    /// Data leaving the engine
    Outbound,
}

/// Whether a captured payload is a request or a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PayloadKind {
    /// Request sent or received
    Request,
    /// Response sent or received
    Response,
}

/// One diagnostic entry in a correlation context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingEvent {
    /// When the event happened
    pub timestamp: DateTime<Utc>,
    /// Severity
    pub level: LogLevel,
    /// Human readable message
    pub message: String,
}

/// A payload captured during an adapter call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadCapture {
    /// Execution the payload belongs to
    pub correlation_id: CorrelationId,
    /// Adapter name
    pub adapter: String,
    /// Adapter protocol
    pub protocol: String,
    /// Request or response
    pub kind: PayloadKind,
    /// Inbound or outbound
    pub direction: Direction,
    /// Payload rendered as text
    pub content: String,
    /// Payload size in bytes
    pub size: usize,
    /// Capture time
    pub timestamp: DateTime<Utc>,
}

/// Call queued for the execution recorder
#[derive(Debug)]
enum RecorderCall {
    Payload(PayloadCapture),
    Event(ProcessingEvent),
    Outcome(ExecutionRecord),
}

/// Channel feeding the single task that drains recorder calls
struct RecorderQueue {
    sender: mpsc::UnboundedSender<RecorderCall>,
    drainer: JoinHandle<()>,
}

/// Per-execution context threaded through every adapter call.
///
/// The event log is append-only. Recorder calls go through one queue per
/// context and reach the recorder in the order they were made, off the
/// caller's task. A failing recorder is logged and otherwise ignored.
pub struct CorrelationContext {
    id: CorrelationId,
    protocol: String,
    headers: BTreeMap<String, String>,
    flow_id: Option<FlowId>,
    flow_name: Option<String>,
    endpoint_flow: bool,
    started_at: DateTime<Utc>,
    events: Mutex<Vec<ProcessingEvent>>,
    recorder: Option<Arc<dyn ExecutionRecorder>>,
    queue: Mutex<Option<RecorderQueue>>,
}

impl fmt::Debug for CorrelationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationContext")
            .field("id", &self.id)
            .field("protocol", &self.protocol)
            .field("flow_id", &self.flow_id)
            .field("endpoint_flow", &self.endpoint_flow)
            .finish()
    }
}

impl CorrelationContext {
    /// New context with a generated id
    pub fn new(protocol: impl Into<String>) -> Self {
        Self::with_id(CorrelationId::generate(), protocol)
    }

    /// New context with a known id
    pub fn with_id(id: CorrelationId, protocol: impl Into<String>) -> Self {
        Self {
            id,
            protocol: protocol.into(),
            headers: BTreeMap::new(),
            flow_id: None,
            flow_name: None,
            endpoint_flow: false,
            started_at: Utc::now(),
            events: Mutex::new(Vec::new()),
            recorder: None,
            queue: Mutex::new(None),
        }
    }

    /// New context for an inbound request; reuses the caller's correlation id
    /// header when present.
    pub fn from_headers(protocol: impl Into<String>, headers: BTreeMap<String, String>) -> Self {
        let id = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(CORRELATION_HEADER))
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
            .map(|v| CorrelationId(v.to_string()))
            .unwrap_or_else(CorrelationId::generate);
        let mut ctx = Self::with_id(id, protocol);
        ctx.headers = headers;
        ctx
    }

    /// Builder: attach the recorder that receives captures and events
    pub fn with_recorder(mut self, recorder: Arc<dyn ExecutionRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Builder: mark the execution as serving a published endpoint
    pub fn for_endpoint(mut self) -> Self {
        self.endpoint_flow = true;
        self
    }

    /// Associate the context with the flow being executed
    pub fn bind_flow(&mut self, flow: &IntegrationFlow) {
        self.flow_id = Some(flow.id.clone());
        self.flow_name = Some(flow.name.clone());
    }

    /// Correlation id
    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    /// Originating protocol
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Inbound headers
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Flow the context is bound to
    pub fn flow_id(&self) -> Option<&FlowId> {
        self.flow_id.as_ref()
    }

    /// Whether the execution serves a published endpoint
    pub fn is_endpoint_flow(&self) -> bool {
        self.endpoint_flow
    }

    /// When the context was created
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Snapshot of the event log
    pub fn events(&self) -> Vec<ProcessingEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Append a processing-step event
    pub fn record_step(&self, level: LogLevel, message: impl Into<String>) {
        let event = ProcessingEvent {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        };
        debug!(correlation_id = %self.id, message = %event.message, "processing step");
        self.push_event(event.clone());

        self.dispatch(RecorderCall::Event(event));
    }

    /// Capture a request or response payload exchanged with an adapter
    pub fn capture_payload(
        &self,
        adapter: &AdapterDescriptor,
        kind: PayloadKind,
        direction: Direction,
        payload: &Payload,
    ) {
        let capture = PayloadCapture {
            correlation_id: self.id.clone(),
            adapter: adapter.name.clone(),
            protocol: adapter.adapter_type.as_str().to_string(),
            kind,
            direction,
            content: payload.to_text_lossy(),
            size: payload.len(),
            timestamp: Utc::now(),
        };
        self.push_event(ProcessingEvent {
            timestamp: capture.timestamp,
            level: LogLevel::Debug,
            message: format!(
                "{:?} {:?} payload for adapter '{}' ({} bytes)",
                direction, kind, adapter.name, capture.size
            ),
        });

        self.dispatch(RecorderCall::Payload(capture));
    }

    /// Hand the final outcome of the execution to the recorder
    pub fn record_outcome(&self, record: ExecutionRecord) {
        self.dispatch(RecorderCall::Outcome(record));
    }

    /// Wait for every recorder call dispatched so far
    pub async fn flush(&self) {
        let queue = self
            .queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(RecorderQueue { sender, drainer }) = queue {
            drop(sender);
            let _ = drainer.await;
        }
    }

    fn push_event(&self, event: ProcessingEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }

    fn dispatch(&self, call: RecorderCall) {
        let Some(recorder) = self.recorder.clone() else {
            return;
        };
        let mut queue = self
            .queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if queue.is_none() {
            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                debug!(correlation_id = %self.id, "no runtime, recorder call skipped");
                return;
            };
            let (sender, receiver) = mpsc::unbounded_channel();
            let drainer = runtime.spawn(drain(self.id.clone(), recorder, receiver));
            *queue = Some(RecorderQueue { sender, drainer });
        }

        if let Some(queue) = queue.as_ref() {
            if queue.sender.send(call).is_err() {
                warn!(correlation_id = %self.id, "recorder queue closed, call dropped");
            }
        }
    }
}

async fn drain(
    id: CorrelationId,
    recorder: Arc<dyn ExecutionRecorder>,
    mut receiver: mpsc::UnboundedReceiver<RecorderCall>,
) {
    while let Some(call) = receiver.recv().await {
        let result = match call {
            RecorderCall::Payload(capture) => recorder.record_payload(capture).await,
            RecorderCall::Event(event) => recorder.record_event(&id, event).await,
            RecorderCall::Outcome(record) => recorder.record_outcome(record).await,
        };
        if let Err(err) = result {
            warn!(correlation_id = %id, ?err, "failed to record execution event");
        }
    }
}
