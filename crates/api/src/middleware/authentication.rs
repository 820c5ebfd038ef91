use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, header};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;

use warden_auth::TokenVerifier;
use warden_core::SecurityError;
use warden_events::{EventDraft, EventEmitter, EventType};

use crate::context::PrincipalContext;
use crate::errors::security_error_response;

use super::{correlation_of, request_origin};

#[derive(Clone)]
pub struct AuthnState {
    pub verifier: Arc<dyn TokenVerifier>,
    pub emitter: EventEmitter,
}

/// Verify the bearer token and attach the caller's claims.
///
/// `OPTIONS` requests (CORS preflight) pass through untouched.
pub async fn authentication_middleware(
    State(state): State<AuthnState>,
    mut req: Request,
    next: Next,
) -> Response {
    if req.method() == Method::OPTIONS {
        return next.run(req).await;
    }

    let correlation = correlation_of(&req);
    let origin = request_origin(&req);

    let authenticated = extract_bearer(req.headers()).and_then(|(authorization, token)| {
        state
            .verifier
            .authenticate(token, Utc::now())
            .map(|claims| (authorization.to_string(), claims))
            .map_err(SecurityError::from)
    });

    match authenticated {
        Ok((authorization, claims)) => {
            let claims = Arc::new(claims);
            tracing::info!(subject = %claims.subject, "authenticated");

            state
                .emitter
                .emit_best_effort(
                    &correlation,
                    EventDraft::new(EventType::LoginSuccess)
                        .claims(Some(claims.as_ref()))
                        .origin(origin),
                )
                .await;

            req.extensions_mut()
                .insert(PrincipalContext::new(claims, authorization));
            next.run(req).await
        }
        Err(err) => {
            tracing::warn!(error = %err, code = err.code(), "authentication failed");

            state
                .emitter
                .emit_best_effort(
                    &correlation,
                    EventDraft::new(EventType::LoginFailure)
                        .origin(origin)
                        .field("reason", err.to_string()),
                )
                .await;

            security_error_response(&err, &correlation)
        }
    }
}

/// `(full header value, token)`. The scheme is matched case-insensitively.
fn extract_bearer(headers: &HeaderMap) -> Result<(&str, &str), SecurityError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(SecurityError::MissingToken)?
        .to_str()
        .map_err(|_| SecurityError::MalformedToken("authorization header is not ascii".into()))?
        .trim();

    if value.is_empty() {
        return Err(SecurityError::MissingToken);
    }

    let (scheme, token) = value.split_once(' ').unwrap_or((value, ""));
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(SecurityError::MalformedToken(format!(
            "unsupported authorization scheme '{scheme}'"
        )));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(SecurityError::MissingToken);
    }

    Ok((value, token))
}
