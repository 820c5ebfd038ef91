use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;

use warden_core::CorrelationContext;
use warden_core::correlation::{REQUEST_ID_HEADER, SESSION_ID_HEADER};

use super::header_str;

/// Resolve request/session IDs, expose them to later stages and echo them on
/// the response. Never fails.
pub async fn correlation_middleware(mut req: Request, next: Next) -> Response {
    let ctx = CorrelationContext::resolve(
        header_str(req.headers(), REQUEST_ID_HEADER),
        header_str(req.headers(), SESSION_ID_HEADER),
    );

    let request_id = header_value(&ctx.request_id());
    let session_id = header_value(&ctx.session_id());

    // Normalize inbound headers so handlers see the resolved IDs too.
    if let Some(v) = &request_id {
        req.headers_mut().insert(REQUEST_ID_HEADER, v.clone());
    }
    if let Some(v) = &session_id {
        req.headers_mut().insert(SESSION_ID_HEADER, v.clone());
    }
    req.extensions_mut().insert(ctx);

    let span = tracing::info_span!(
        "request",
        request_id = %ctx.request_id(),
        session_id = %ctx.session_id(),
        method = %req.method(),
        path = %req.uri().path(),
    );

    let mut response = next.run(req).instrument(span).await;

    if let Some(v) = request_id {
        response.headers_mut().insert(REQUEST_ID_HEADER, v);
    }
    if let Some(v) = session_id {
        response.headers_mut().insert(SESSION_ID_HEADER, v);
    }
    response
}

fn header_value(id: &impl core::fmt::Display) -> Option<HeaderValue> {
    HeaderValue::from_str(&id.to_string()).ok()
}
