use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use warden_core::{CorrelationContext, RequestId, SecurityError};

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
    request_id: RequestId,
) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
            "request_id": request_id,
        })),
    )
        .into_response()
}

/// Terminal response for a pipeline error. Only the machine code and a
/// generic message reach the caller.
pub fn security_error_response(err: &SecurityError, correlation: &CorrelationContext) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    json_error(status, err.code(), err.public_message(), correlation.request_id())
}
