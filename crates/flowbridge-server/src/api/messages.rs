//! Manual execution and message log handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use flowbridge_core::{CoreError, CorrelationId, ExecutionReport, FlowId, FlowOutcome, Payload};
use flowbridge_state_inmemory::MessageLogEntry;

use crate::api::errors::ApiError;
use crate::server::FlowBridgeServer;

fn report_json(report: &ExecutionReport) -> Value {
    let (outcome, detail) = match &report.outcome {
        FlowOutcome::Delivered { .. } => ("DELIVERED", Value::Null),
        FlowOutcome::DirectTransfer { bytes, .. } => ("DIRECT_TRANSFER", json!({ "bytes": bytes })),
        FlowOutcome::Filtered { step, reason } => ("FILTERED", json!({ "step": step, "reason": reason })),
    };
    json!({
        "correlationId": report.correlation_id,
        "flowId": report.flow_id,
        "outcome": outcome,
        "detail": detail,
        "states": report.states,
        "inputSize": report.input_size,
        "outputSize": report.output_size,
        "durationMs": report.duration_ms,
        "response": report.outcome.response().map(Payload::to_text_lossy),
        "events": report.events,
    })
}

/// `POST /flows/:flow_id/execute`: run a flow once, pulling from its source
pub async fn execute_flow_handler(
    State(server): State<Arc<FlowBridgeServer>>,
    Path(flow_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match server.executor().execute_flow(&FlowId(flow_id.clone())).await {
        Ok(report) => Ok(Json(report_json(&report))),
        Err(err @ CoreError::NotFound { .. }) => Err(ApiError::Flow {
            flow_id: Some(flow_id),
            status: StatusCode::NOT_FOUND,
            error: err,
        }),
        Err(err) => Err(ApiError::execution(Some(flow_id), err)),
    }
}

/// `GET /flows/:flow_id/messages`: recorded executions of a flow, most recent first
pub async fn flow_messages_handler(
    State(server): State<Arc<FlowBridgeServer>>,
    Path(flow_id): Path<String>,
) -> Json<Vec<MessageLogEntry>> {
    Json(server.message_log().entries_for_flow(&FlowId(flow_id)).await)
}

/// `GET /messages/:correlation_id`
pub async fn message_handler(
    State(server): State<Arc<FlowBridgeServer>>,
    Path(correlation_id): Path<String>,
) -> Result<Json<MessageLogEntry>, ApiError> {
    server
        .message_log()
        .get(&CorrelationId(correlation_id.clone()))
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No messages recorded for {}", correlation_id)))
}
