use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;

use warden_auth::RequiredEntitlements;
use warden_core::{CorrelationContext, SecurityError};
use warden_events::{EventDraft, EventEmitter, EventType, RequestOrigin};
use warden_infra::{Decision, DecisionSource, EntitlementResolver};

use crate::context::PrincipalContext;
use crate::errors::security_error_response;

use super::{correlation_of, request_origin};

#[derive(Clone)]
pub struct AuthzState {
    pub resolver: Arc<EntitlementResolver>,
    pub emitter: EventEmitter,
    pub required: Arc<RequiredEntitlements>,
}

/// Admit the caller only if they hold one of the required entitlements.
pub async fn authorization_middleware(
    State(state): State<AuthzState>,
    req: Request,
    next: Next,
) -> Response {
    if req.method() == Method::OPTIONS {
        return next.run(req).await;
    }

    let correlation = correlation_of(&req);
    let origin = request_origin(&req);

    let Some(principal) = req.extensions().get::<PrincipalContext>().cloned() else {
        return deny(
            &state,
            correlation,
            origin,
            None,
            SecurityError::ClaimsMissing("no authenticated principal".into()),
        )
        .await;
    };

    if principal.authorization().is_empty() {
        return deny(
            &state,
            correlation,
            origin,
            Some(&principal),
            SecurityError::ClaimsMissing("bearer token unavailable".into()),
        )
        .await;
    }

    let decision = state
        .resolver
        .resolve(principal.subject(), principal.authorization(), &state.required)
        .await;

    match decision {
        Ok(Decision::Allowed { source, matched }) => {
            tracing::debug!(
                subject = principal.subject(),
                entitlement = %matched.name,
                cached = source == DecisionSource::Cache,
                "authorized"
            );
            next.run(req).await
        }
        Ok(Decision::NotMember) => {
            deny(
                &state,
                correlation,
                origin,
                Some(&principal),
                SecurityError::PermissionDenied,
            )
            .await
        }
        Ok(Decision::Refused { status }) => {
            deny(
                &state,
                correlation,
                origin,
                Some(&principal),
                SecurityError::EntitlementRefused(status),
            )
            .await
        }
        Err(e) => {
            deny(
                &state,
                correlation,
                origin,
                Some(&principal),
                SecurityError::from(e),
            )
            .await
        }
    }
}

/// Emit `authz.denied` (or `authz.error` for 5xx) and build the terminal response.
async fn deny(
    state: &AuthzState,
    correlation: CorrelationContext,
    origin: RequestOrigin,
    principal: Option<&PrincipalContext>,
    err: SecurityError,
) -> Response {
    let event_type = if err.status_code() >= 500 {
        tracing::error!(error = %err, "authorization failed");
        EventType::AuthzError
    } else {
        tracing::warn!(error = %err, code = err.code(), "authorization denied");
        EventType::AuthzDenied
    };

    state
        .emitter
        .emit_best_effort(
            &correlation,
            EventDraft::new(event_type)
                .claims(principal.map(|p| p.claims().as_ref()))
                .origin(origin)
                .message(Some(err.to_string()))
                .field("error", err.to_string())
                .field("required", state.required.names()),
        )
        .await;

    security_error_response(&err, &correlation)
}
