//! Deployment lifecycle handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use tracing::info;

use flowbridge_core::{DeploymentInfo, FlowId};

use crate::api::errors::ApiError;
use crate::server::FlowBridgeServer;

/// Header naming the operator behind a deployment action
pub const ACTOR_HEADER: &str = "x-user";

fn actor(headers: &HeaderMap) -> String {
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("system")
        .to_string()
}

/// `POST /flows/:flow_id/deployment/deploy`
pub async fn deploy_flow_handler(
    State(server): State<Arc<FlowBridgeServer>>,
    Path(flow_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<DeploymentInfo>, ApiError> {
    let actor = actor(&headers);
    info!(%flow_id, %actor, "Deploy requested");

    let info = server
        .deployment()
        .deploy(&FlowId(flow_id.clone()), &actor)
        .await
        .map_err(|err| ApiError::deployment(flow_id, err))?;
    Ok(Json(info))
}

/// `POST /flows/:flow_id/deployment/undeploy`
pub async fn undeploy_flow_handler(
    State(server): State<Arc<FlowBridgeServer>>,
    Path(flow_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let actor = actor(&headers);
    info!(%flow_id, %actor, "Undeploy requested");

    server
        .deployment()
        .undeploy(&FlowId(flow_id.clone()), &actor)
        .await
        .map_err(|err| ApiError::deployment(flow_id, err))?;
    Ok(StatusCode::OK)
}

/// `GET /flows/:flow_id/deployment`
pub async fn deployment_info_handler(
    State(server): State<Arc<FlowBridgeServer>>,
    Path(flow_id): Path<String>,
) -> Result<Json<DeploymentInfo>, ApiError> {
    match server
        .deployment()
        .deployment_info(&FlowId(flow_id.clone()))
        .await
        .map_err(|err| ApiError::deployment(flow_id.clone(), err))?
    {
        Some(info) => Ok(Json(info)),
        None => Err(ApiError::NotFound(format!("Flow {} is not deployed", flow_id))),
    }
}
