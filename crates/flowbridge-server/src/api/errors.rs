//! Error handling for the FlowBridge server API
//!
//! Flow related failures are reported as `{error, type, flowId}`; everything
//! else uses a plain `{error}` body.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, warn};

use flowbridge_core::xml::soap;
use flowbridge_core::CoreError;

use crate::error::ServerError;

/// API Error type for returning standard error responses
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),
    /// Not found (404)
    NotFound(String),
    /// Internal server error (500)
    InternalServerError(String),
    /// Engine failure while handling a flow
    Flow {
        /// Flow the request was about, when known
        flow_id: Option<String>,
        /// Response status
        status: StatusCode,
        /// Underlying failure
        error: CoreError,
    },
    /// Wrapped server error
    ServerError(ServerError),
}

impl ApiError {
    /// Deploy/undeploy failure: 404 when something is missing, 400 otherwise
    pub fn deployment(flow_id: impl Into<String>, error: CoreError) -> Self {
        let status = match error.root_cause() {
            CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        ApiError::Flow {
            flow_id: Some(flow_id.into()),
            status,
            error,
        }
    }

    /// Execution failure: 404 when no flow serves the request, 500 otherwise
    pub fn execution(flow_id: Option<String>, error: CoreError) -> Self {
        ApiError::Flow {
            flow_id,
            status: execution_status(&error),
            error,
        }
    }
}

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        ApiError::ServerError(err)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
            ApiError::Flow { error, .. } => write!(f, "{}", error),
            ApiError::ServerError(err) => write!(f, "Server Error: {}", err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::Flow {
                flow_id,
                status,
                error,
            } => {
                if status.is_server_error() {
                    error!(flow_id = ?flow_id, error = %error, "Flow request failed");
                } else {
                    warn!(flow_id = ?flow_id, error = %error, "Flow request rejected");
                }
                let body = Json(json!({
                    "error": error.to_string(),
                    "type": error.error_type(),
                    "flowId": flow_id,
                }));
                return (status, body).into_response();
            }
            ApiError::ServerError(ServerError::Core(err)) => {
                return ApiError::execution(None, err).into_response();
            }
            ApiError::ServerError(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Status for a failed synchronous execution
pub fn execution_status(error: &CoreError) -> StatusCode {
    match error {
        CoreError::NoDeployedFlow(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// SOAP 1.1 fault response for a failed SOAP call
pub fn soap_fault_response(error: &CoreError) -> Response {
    let status = execution_status(error);
    let code = if status == StatusCode::NOT_FOUND { "Client" } else { "Server" };
    error!(error = %error, error_type = error.error_type(), "SOAP request failed");
    (
        status,
        [(header::CONTENT_TYPE, "text/xml; charset=utf-8")],
        soap::fault(code, &error.to_string()),
    )
        .into_response()
}
