//! Error types for the gateway crate.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use shellbox_executor::ExecutorError;

/// Errors that can occur during gateway request handling.
///
/// Every variant renders as JSON with a human-readable `output` field; the
/// HTTP status is the only machine-readable error signal.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// No environment could be provisioned for a run request.
    #[error("could not start terminal environment: {0}")]
    Provision(#[source] ExecutorError),

    /// The command could not be executed or its output stream failed.
    #[error("{0}")]
    Execution(#[source] ExecutorError),

    /// A reset could not provision the replacement environment.
    #[error("failed to start new terminal environment: {0}")]
    Reset(#[source] ExecutorError),

    /// Every environment slot is taken.
    #[error("environment limit of {limit} reached; try again later")]
    CapacityExhausted { limit: usize },

    /// The request body is malformed or contains invalid values.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            GatewayError::Provision(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"output": "Error: Could not start terminal environment.", "exitCode": 1}),
            ),
            GatewayError::Execution(e) => {
                let status = if matches!(e, ExecutorError::Timeout(_)) {
                    StatusCode::GATEWAY_TIMEOUT
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                (status, json!({"output": format!("Execution Error: {e}")}))
            }
            GatewayError::Reset(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"output": "Error: Failed to start new terminal environment.", "error": null}),
            ),
            GatewayError::CapacityExhausted { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({"output": format!("Error: {self}"), "exitCode": 1}),
            ),
            GatewayError::InvalidRequest(_) => (
                StatusCode::BAD_REQUEST,
                json!({"output": format!("Error: {self}"), "exitCode": 1}),
            ),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use axum::response::IntoResponse;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = match axum::body::to_bytes(resp.into_body(), 4096).await {
            Ok(b) => b,
            Err(e) => panic!("failed to read body: {e}"),
        };
        match serde_json::from_slice(&bytes) {
            Ok(v) => v,
            Err(e) => panic!("invalid JSON: {e}"),
        }
    }

    #[test]
    fn gateway_error_status_codes_map_correctly() {
        let bad_req = GatewayError::InvalidRequest("missing field".to_owned());
        assert_eq!(bad_req.into_response().status(), StatusCode::BAD_REQUEST);

        let full = GatewayError::CapacityExhausted { limit: 2 };
        assert_eq!(full.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);

        let timeout = GatewayError::Execution(ExecutorError::Timeout(Duration::from_secs(5)));
        assert_eq!(timeout.into_response().status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn provision_error_hides_details_and_reports_exit_code_one() {
        let err = GatewayError::Provision(ExecutorError::Provision("No such image".to_owned()));
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert_eq!(body["output"], "Error: Could not start terminal environment.");
        assert_eq!(body["exitCode"], 1);
    }

    #[tokio::test]
    async fn execution_error_includes_message() {
        let err = GatewayError::Execution(ExecutorError::Execution("stream reset".to_owned()));
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        let output = body["output"].as_str().unwrap_or_default();
        assert!(output.starts_with("Execution Error: "), "got {output}");
        assert!(output.contains("stream reset"), "got {output}");
    }

    #[tokio::test]
    async fn reset_error_has_null_error_field() {
        let err = GatewayError::Reset(ExecutorError::Provision("boom".to_owned()));
        let body = body_json(err.into_response()).await;
        assert_eq!(body["output"], "Error: Failed to start new terminal environment.");
        assert!(body["error"].is_null());
    }
}
