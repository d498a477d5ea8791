//! Handlers for published SOAP and REST endpoints

use std::sync::Arc;

use axum::{
    extract::{RawQuery, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use tracing::debug;

use crate::api::errors::{soap_fault_response, ApiError};
use crate::api::header_map;
use crate::server::FlowBridgeServer;

const XML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

fn wants_wsdl(query: Option<&str>) -> bool {
    query.map_or(false, |query| {
        query
            .split('&')
            .any(|pair| pair.split('=').next().map_or(false, |key| key.eq_ignore_ascii_case("wsdl")))
    })
}

/// `GET /soap/*path?wsdl`
pub async fn wsdl_handler(
    State(server): State<Arc<FlowBridgeServer>>,
    uri: Uri,
    RawQuery(query): RawQuery,
) -> Response {
    if !wants_wsdl(query.as_deref()) {
        return ApiError::BadRequest("SOAP endpoints accept POST; use ?wsdl for the service description".to_string())
            .into_response();
    }

    match server.endpoints().generate_wsdl(uri.path()).await {
        Ok(wsdl) => (StatusCode::OK, [(header::CONTENT_TYPE, XML_CONTENT_TYPE)], wsdl).into_response(),
        Err(err) => ApiError::execution(None, err).into_response(),
    }
}

/// `POST /soap/*path`
pub async fn soap_handler(
    State(server): State<Arc<FlowBridgeServer>>,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    debug!(path = uri.path(), size = body.len(), "SOAP request received");
    match server
        .endpoints()
        .process_soap_request(uri.path(), &body, header_map(&headers))
        .await
    {
        Ok(envelope) => (StatusCode::OK, [(header::CONTENT_TYPE, XML_CONTENT_TYPE)], envelope).into_response(),
        Err(err) => soap_fault_response(&err),
    }
}

/// Any method on `/api/integration/*path`
pub async fn rest_handler(
    State(server): State<Arc<FlowBridgeServer>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, ApiError> {
    debug!(path = uri.path(), %method, size = body.len(), "REST request received");
    let path = uri.path();

    match server
        .endpoints()
        .process_rest_request(path, method.as_str(), &body, header_map(&headers))
        .await
    {
        Ok(value) => Ok(Json(value)),
        Err(err) => {
            let flow_id = server
                .endpoints()
                .find_deployed_flow(path)
                .await
                .ok()
                .map(|flow| flow.id.to_string());
            Err(ApiError::execution(flow_id, err))
        }
    }
}
