//! Audit stage: one `audit.log` event per request that reaches the handler.
//!
//! Request bodies are captured only for POST/PUT/PATCH with a JSON content
//! type, and only up to `body_limit` bytes. Capture reads a prefix of the body
//! stream and re-chains it in front of the unread remainder, so the handler
//! always receives the complete original bytes. Response bodies are captured
//! when the status is >= 400.

use axum::body::{Body, Bytes};
use axum::extract::{MatchedPath, Request, State};
use axum::http::{Method, header};
use axum::middleware::Next;
use axum::response::Response;
use futures_util::{StreamExt, stream};
use serde_json::Value as JsonValue;

use warden_events::{EventDraft, EventEmitter, EventType, RawJson};

use crate::context::PrincipalContext;

use super::{correlation_of, header_str, message_of, remote_addr, request_origin};

pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AuditState {
    pub emitter: EventEmitter,
    pub body_limit: usize,
}

pub async fn audit_middleware(
    State(state): State<AuditState>,
    req: Request,
    next: Next,
) -> Response {
    let correlation = correlation_of(&req);
    let origin = request_origin(&req);
    let principal = req.extensions().get::<PrincipalContext>().cloned();
    let message = message_of(&req);

    let method = req.method().clone();
    let full_url = req.uri().to_string();
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let content_type = header_str(req.headers(), header::CONTENT_TYPE)
        .unwrap_or_default()
        .to_string();
    let source_ip = remote_addr(&req).map(|a| a.ip().to_string()).unwrap_or_default();

    let (req, captured) = if captures_request_body(&method, &content_type) {
        let (parts, body) = req.into_parts();
        let (captured, body) = capture_prefix(body, state.body_limit).await;
        if captured.truncated {
            tracing::warn!(limit = state.body_limit, "request body truncated for audit");
        }
        (Request::from_parts(parts, body), Some(captured))
    } else {
        (req, None)
    };

    let response = next.run(req).await;
    let status = response.status();

    let (response, response_payload) = if status.as_u16() >= 400 {
        let (parts, body) = response.into_parts();
        let (captured, body) = capture_prefix(body, state.body_limit).await;
        (Response::from_parts(parts, body), Some(decode_response(&captured.bytes)))
    } else {
        (response, None)
    };

    let request_payload = captured.as_ref().and_then(|c| RawJson::from_slice(&c.bytes));
    let claims = principal.as_ref().map(|p| p.claims().as_ref());

    let mut draft = EventDraft::new(EventType::AuditLog)
        .claims(claims)
        .origin(origin)
        .message(message)
        .field(
            "jti",
            claims.map(|c| c.token_id.to_string()).unwrap_or_default(),
        )
        .field("http_method", method.as_str())
        .field("resource", derive_resource(&endpoint))
        .field("endpoint", endpoint.as_str())
        .field("full_url", full_url)
        .field("source_ip", source_ip)
        .field("payload", JsonValue::Null)
        .field("content_type", content_type)
        .field("status_code", status.as_u16())
        .field(
            "payload_truncated",
            captured.as_ref().is_some_and(|c| c.truncated),
        );
    if let Some(body) = request_payload {
        draft = draft.raw_field("payload", body);
    }
    match response_payload {
        Some(ResponsePayload::Json(body)) => draft = draft.raw_field("response_payload", body),
        Some(ResponsePayload::Text(body)) => draft = draft.field("response_payload", body),
        None => {}
    }

    state.emitter.emit_best_effort(&correlation, draft).await;

    response
}

/// Mutating verb with `application/json` or any `*/*+json` media type.
fn captures_request_body(method: &Method, content_type: &str) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH) && is_json(content_type)
}

fn is_json(content_type: &str) -> bool {
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    media_type == "application/json" || media_type.ends_with("+json")
}

/// First path segment of the route, or `"unknown"` for the root.
fn derive_resource(path: &str) -> String {
    path.trim_matches('/')
        .split('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

#[derive(Debug, PartialEq)]
enum ResponsePayload {
    Json(RawJson),
    Text(String),
}

/// JSON bodies are kept verbatim; anything else is recorded as text.
fn decode_response(bytes: &[u8]) -> ResponsePayload {
    match RawJson::from_slice(bytes) {
        Some(json) => ResponsePayload::Json(json),
        None => ResponsePayload::Text(String::from_utf8_lossy(bytes).into_owned()),
    }
}

#[derive(Debug, Default)]
struct Captured {
    bytes: Bytes,
    truncated: bool,
}

/// Read at most `limit + 1` bytes of `body` for inspection and return a body
/// that yields exactly the original bytes, including whatever was not read.
async fn capture_prefix(body: Body, limit: usize) -> (Captured, Body) {
    let mut data = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut seen = 0usize;
    let mut failure = None;
    let mut finished = false;

    while seen <= limit {
        match data.next().await {
            Some(Ok(chunk)) => {
                seen += chunk.len();
                chunks.push(chunk);
            }
            Some(Err(e)) => {
                failure = Some(e);
                break;
            }
            None => {
                finished = true;
                break;
            }
        }
    }

    let mut prefix = Vec::with_capacity(seen.min(limit));
    for chunk in &chunks {
        let room = limit - prefix.len();
        if room == 0 {
            break;
        }
        prefix.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }
    let captured = Captured {
        bytes: Bytes::from(prefix),
        truncated: seen > limit,
    };

    let replay = stream::iter(chunks.into_iter().map(Ok::<_, axum::Error>));
    let body = match (failure, finished) {
        (Some(e), _) => Body::from_stream(replay.chain(stream::once(async move { Err(e) }))),
        (None, true) => Body::from_stream(replay),
        (None, false) => Body::from_stream(replay.chain(data)),
    };

    (captured, body)
}
