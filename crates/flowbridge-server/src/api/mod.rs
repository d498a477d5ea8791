//! API module for the FlowBridge server
//!
//! Deployment management, manual execution and the message log live under
//! `/flows` and `/messages`; deployed flows are served under `/soap` and
//! `/api/integration`.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    http::HeaderMap,
    routing::{any, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub mod deployment;
pub mod errors;
pub mod health;
pub mod integration;
pub mod messages;

use crate::server::FlowBridgeServer;

/// Build the router for API endpoints
pub fn build_router(server: Arc<FlowBridgeServer>) -> Router {
    Router::new()
        // Deployment lifecycle
        .route("/flows/:flow_id/deployment", get(deployment::deployment_info_handler))
        .route("/flows/:flow_id/deployment/deploy", post(deployment::deploy_flow_handler))
        .route("/flows/:flow_id/deployment/undeploy", post(deployment::undeploy_flow_handler))

        // Manual execution and message log
        .route("/flows/:flow_id/execute", post(messages::execute_flow_handler))
        .route("/flows/:flow_id/messages", get(messages::flow_messages_handler))
        .route("/messages/:correlation_id", get(messages::message_handler))

        // Published endpoints
        .route("/soap/*path", get(integration::wsdl_handler).post(integration::soap_handler))
        .route("/api/integration/*path", any(integration::rest_handler))

        // Health check
        .route("/health", get(health::health_check))

        .layer(TraceLayer::new_for_http())
        .with_state(server)
}

/// Request headers as a name to value map; non text values are dropped
pub(crate) fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}
