use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{SecondsFormat, Utc};

use warden_events::{EventDraft, EventEmitter, EventType};

use crate::app::UsageSettings;
use crate::context::PrincipalContext;

use super::{OWNER_ID_HEADER, correlation_of, header_str, message_of, request_origin};

#[derive(Clone)]
pub struct UsageState {
    pub emitter: EventEmitter,
    pub settings: UsageSettings,
}

/// Emit a `usage.log` record bracketing the handler call.
pub async fn usage_middleware(
    State(state): State<UsageState>,
    req: Request,
    next: Next,
) -> Response {
    let correlation = correlation_of(&req);
    let origin = request_origin(&req);
    let principal = req.extensions().get::<PrincipalContext>().cloned();
    let owner_id = header_str(req.headers(), OWNER_ID_HEADER).map(str::to_string);
    let message = message_of(&req);

    let start = Utc::now();
    let started = Instant::now();

    let response = next.run(req).await;

    let end = Utc::now();
    let duration_ms = started.elapsed().as_millis() as u64;

    let Some(principal) = principal else {
        tracing::warn!("usage record skipped: no authenticated principal");
        return response;
    };

    let settings = &state.settings;
    let mut draft = EventDraft::new(EventType::UsageLog)
        .claims(Some(principal.claims().as_ref()))
        .origin(origin)
        .message(message)
        .field("product_id", settings.product_id.to_string())
        .field("memory_mb", settings.memory_mb)
        .field("start_time", start.to_rfc3339_opts(SecondsFormat::Millis, true))
        .field("end_time", end.to_rfc3339_opts(SecondsFormat::Millis, true))
        .field("duration_ms", duration_ms)
        .field("status", "draft")
        .field("user_id", principal.subject())
        .field("service_name", settings.service_name.as_str());
    if let Some(owner_id) = owner_id {
        draft = draft.field("owner_id", owner_id);
    }

    state.emitter.emit_best_effort(&correlation, draft).await;

    response
}
