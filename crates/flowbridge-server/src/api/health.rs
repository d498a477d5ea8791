//! Health check endpoint for the FlowBridge server

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::{debug, warn};

use crate::server::FlowBridgeServer;

/// Health check handler
///
/// Reports the state store and message log. The server is `DOWN` when the
/// flow repository cannot be read.
pub async fn health_check(State(server): State<Arc<FlowBridgeServer>>) -> impl IntoResponse {
    debug!("Health check requested");

    let (store_status, flows, deployed) = match server.repositories().flows.find_all().await {
        Ok(flows) => {
            let deployed = flows.iter().filter(|flow| flow.is_deployed()).count();
            ("UP", flows.len(), deployed)
        }
        Err(err) => {
            warn!(error = %err, "State store health check failed");
            ("DOWN", 0, 0)
        }
    };

    let response = json!({
        "status": store_status,
        "version": env!("CARGO_PKG_VERSION"),
        "dependencies": {
            "stateStore": {
                "status": store_status,
                "flows": flows,
                "deployedFlows": deployed,
            },
            "messageLog": {
                "status": "UP",
                "entries": server.message_log().len().await,
            },
        },
    });

    let status = if store_status == "DOWN" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(response))
}
