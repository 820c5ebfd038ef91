//! Security error taxonomy shared by every pipeline stage.

use thiserror::Error;

/// Result type used across the pipeline.
pub type SecurityResult<T> = Result<T, SecurityError>;

/// Pipeline-level error.
///
/// Each variant maps to a fixed HTTP status and a machine code. The `String`
/// payloads are internal detail for logs only; callers only ever see
/// [`SecurityError::public_message`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecurityError {
    /// No bearer token on the request.
    #[error("missing bearer token")]
    MissingToken,

    /// The token could not be decoded (bad segments, base64 or JSON), or its
    /// claims failed validation.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The cryptographic signature check failed.
    #[error("token signature is invalid")]
    SignatureInvalid,

    /// The token header names an algorithm outside the RSA family.
    #[error("unexpected signing method: {0}")]
    UnexpectedSigningMethod(String),

    /// The claims' resource field does not carry a tenant UUID.
    #[error("tenant unresolved: {0}")]
    TenantUnresolved(String),

    /// Authorization ran without authenticated claims (or without the bearer token).
    #[error("claims missing: {0}")]
    ClaimsMissing(String),

    /// The entitlement service answered with a non-200 status.
    #[error("entitlement service refused request (status {0})")]
    EntitlementRefused(u16),

    /// Transport/read failure talking to the entitlement service.
    #[error("entitlement api error: {0}")]
    EntitlementApi(String),

    /// The subject holds none of the required entitlements.
    #[error("permission denied")]
    PermissionDenied,

    /// An event could not be delivered. Logged, never surfaced to callers.
    #[error("event delivery failure: {0}")]
    EventDeliveryFailure(String),

    /// An identifier failed to parse.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl SecurityError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn entitlement_api(msg: impl Into<String>) -> Self {
        Self::EntitlementApi(msg.into())
    }

    /// HTTP status code this error terminates a request with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingToken
            | Self::MalformedToken(_)
            | Self::SignatureInvalid
            | Self::UnexpectedSigningMethod(_)
            | Self::TenantUnresolved(_)
            | Self::ClaimsMissing(_)
            | Self::EntitlementRefused(_) => 401,
            Self::PermissionDenied => 403,
            Self::InvalidId(_) => 400,
            Self::EntitlementApi(_) | Self::EventDeliveryFailure(_) => 500,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::MalformedToken(_) => "malformed_token",
            Self::SignatureInvalid => "signature_invalid",
            Self::UnexpectedSigningMethod(_) => "unexpected_signing_method",
            Self::TenantUnresolved(_) => "tenant_unresolved",
            Self::ClaimsMissing(_) => "claims_missing",
            Self::EntitlementRefused(_) => "entitlement_refused",
            Self::EntitlementApi(_) => "entitlement_api_error",
            Self::PermissionDenied => "permission_denied",
            Self::EventDeliveryFailure(_) => "event_delivery_failure",
            Self::InvalidId(_) => "invalid_id",
        }
    }

    /// Generic message that is safe to return to the caller.
    pub fn public_message(&self) -> &'static str {
        match self.status_code() {
            401 => "unauthorized",
            403 => "permission denied",
            400 => "bad request",
            _ => "internal server error",
        }
    }
}
