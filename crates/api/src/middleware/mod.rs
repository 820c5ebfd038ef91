//! Pipeline stages, outermost first:
//!
//! ```text
//! correlation → authentication → authorization → audit → usage → handler
//! ```
//!
//! Stages share request-scoped state only through typed request extensions
//! ([`CorrelationContext`], [`PrincipalContext`](crate::PrincipalContext)).

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request};
use axum::http::{HeaderMap, HeaderName, header};

use warden_core::correlation::{REQUEST_ID_HEADER, SESSION_ID_HEADER};
use warden_core::CorrelationContext;
use warden_events::RequestOrigin;

pub mod audit;
pub mod authentication;
pub mod authorization;
pub mod correlation;
pub mod usage;

pub use audit::{AuditState, audit_middleware};
pub use authentication::{AuthnState, authentication_middleware};
pub use authorization::{AuthzState, authorization_middleware};
pub use correlation::correlation_middleware;
pub use usage::{UsageState, usage_middleware};

/// Optional caller-supplied message attached to audit and usage events.
pub const MESSAGE_HEADER: HeaderName = HeaderName::from_static("x-message");

/// Optional owner of the usage record.
pub const OWNER_ID_HEADER: HeaderName = HeaderName::from_static("x-owner-id");

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: impl header::AsHeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Correlation set by the correlation stage, or resolved from headers when a
/// stage is mounted without it.
pub(crate) fn correlation_of(req: &Request) -> CorrelationContext {
    req.extensions()
        .get::<CorrelationContext>()
        .copied()
        .unwrap_or_else(|| {
            CorrelationContext::resolve(
                header_str(req.headers(), REQUEST_ID_HEADER),
                header_str(req.headers(), SESSION_ID_HEADER),
            )
        })
}

pub(crate) fn remote_addr(req: &Request) -> Option<SocketAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

pub(crate) fn request_origin(req: &Request) -> RequestOrigin {
    RequestOrigin {
        path: req.uri().path().to_string(),
        user_agent: header_str(req.headers(), header::USER_AGENT)
            .unwrap_or_default()
            .to_string(),
        remote_addr: remote_addr(req).map(|a| a.to_string()).unwrap_or_default(),
    }
}

pub(crate) fn message_of(req: &Request) -> Option<String> {
    header_str(req.headers(), MESSAGE_HEADER).map(str::to_string)
}
