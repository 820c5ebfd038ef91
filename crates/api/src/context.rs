use std::sync::Arc;

use warden_auth::Claims;
use warden_core::TenantId;

/// Authenticated caller for the rest of the request.
///
/// Inserted as a request extension by the authentication stage. Claims are
/// immutable and shared read-only.
#[derive(Clone)]
pub struct PrincipalContext {
    claims: Arc<Claims>,
    authorization: String,
}

impl PrincipalContext {
    pub fn new(claims: Arc<Claims>, authorization: impl Into<String>) -> Self {
        Self {
            claims,
            authorization: authorization.into(),
        }
    }

    pub fn claims(&self) -> &Arc<Claims> {
        &self.claims
    }

    pub fn subject(&self) -> &str {
        &self.claims.subject
    }

    /// `None` when the resource claim does not carry a tenant.
    pub fn tenant_id(&self) -> Option<TenantId> {
        self.claims.tenant_id().ok()
    }

    /// Inbound `Authorization` header value, forwarded verbatim to the
    /// entitlement service.
    pub fn authorization(&self) -> &str {
        &self.authorization
    }
}

impl core::fmt::Debug for PrincipalContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PrincipalContext")
            .field("subject", &self.claims.subject)
            .field("resource", &self.claims.resource)
            .finish_non_exhaustive()
    }
}
