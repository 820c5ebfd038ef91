use axum::body::Bytes;
use axum::extract::Extension;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::context::PrincipalContext;

#[derive(Debug, Serialize)]
pub struct WhoAmI {
    pub subject: String,
    pub tenant_id: Option<String>,
    pub tenant_name: Option<String>,
    pub roles: Vec<String>,
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> Json<WhoAmI> {
    let claims = principal.claims();
    Json(WhoAmI {
        subject: claims.subject.clone(),
        tenant_id: principal.tenant_id().map(|t| t.to_string()),
        tenant_name: claims.tenant_name().ok(),
        roles: claims.roles.clone(),
    })
}

/// Return the request body unchanged, with the same content type.
pub async fn echo(headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| header::HeaderValue::from_static("application/octet-stream"));
    ([(header::CONTENT_TYPE, content_type)], body)
}

pub async fn fail() -> impl IntoResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "boom" })),
    )
}
