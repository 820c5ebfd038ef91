use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use uuid::Uuid;

use warden_core::{SecurityError, TenantId};

/// Claims carried by a verified bearer token.
///
/// Wire names follow the issuer's token format (`iss`, `sub`, `rsc`, ...).
/// Time claims are Unix seconds; `0` means the claim was not set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "iss", default)]
    pub issuer: String,

    /// Subject / principal identifier. Also the entitlement cache key.
    #[serde(rename = "sub", default)]
    pub subject: String,

    #[serde(rename = "aud", default, deserialize_with = "deserialize_audience")]
    pub audience: Vec<String>,

    #[serde(rename = "exp", default, deserialize_with = "deserialize_numeric_date")]
    pub expires_at: i64,

    #[serde(rename = "nbf", default, deserialize_with = "deserialize_numeric_date")]
    pub not_before: i64,

    #[serde(rename = "iat", default, deserialize_with = "deserialize_numeric_date")]
    pub issued_at: i64,

    /// Unique token identifier.
    #[serde(rename = "jti", default)]
    pub token_id: Uuid,

    #[serde(rename = "ver", default)]
    pub version: String,

    /// Classification (user or app).
    #[serde(rename = "cls", default)]
    pub classification: String,

    /// Compound resource: `<tenant-uuid>:<tenant-name>`.
    #[serde(rename = "rsc", default)]
    pub resource: String,

    #[serde(rename = "rol", default)]
    pub roles: Vec<String>,
}

impl Claims {
    /// Tenant encoded in the resource claim.
    pub fn tenant_id(&self) -> Result<TenantId, ClaimsError> {
        Resource::parse(&self.resource).map(|r| r.tenant_id)
    }

    /// Human-readable tenant name encoded in the resource claim.
    pub fn tenant_name(&self) -> Result<String, ClaimsError> {
        Resource::parse(&self.resource).map(|r| r.tenant_name)
    }

    /// Check the claims independently of the signature.
    ///
    /// Every check runs; all violations are returned together (empty = valid).
    pub fn validate(&self, now: DateTime<Utc>, policy: &ClaimsPolicy) -> Vec<FieldError> {
        let now = now.timestamp();
        let mut errors = Vec::new();

        if self.expires_at != 0 && now > self.expires_at {
            errors.push(FieldError::new("exp", "token has expired"));
        }

        if self.not_before != 0 && now < self.not_before {
            errors.push(FieldError::new("nbf", "token not yet valid"));
        }

        if self.issued_at != 0 && now < self.issued_at {
            errors.push(FieldError::new("iat", "token issued in the future"));
        }

        if !policy.allows(&self.issuer) {
            errors.push(FieldError::new(
                "iss",
                format!("issuer '{}' is not allowed", self.issuer),
            ));
        }

        if self.subject.is_empty() {
            errors.push(FieldError::new("sub", "subject is required"));
        }

        if let Err(e) = Resource::parse(&self.resource) {
            errors.push(FieldError::new("rsc", e.to_string()));
        }

        errors
    }
}

/// Parsed form of the compound resource claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub tenant_id: TenantId,
    pub tenant_name: String,
}

impl Resource {
    /// Parse `<tenant-uuid>:<tenant-name>`: exactly two non-empty parts, UUID first.
    pub fn parse(raw: &str) -> Result<Self, ClaimsError> {
        let parts: Vec<&str> = raw.split(':').collect();
        let [tenant, name] = parts.as_slice() else {
            return Err(ClaimsError::TenantUnresolved(format!(
                "expected '<tenant-uuid>:<tenant-name>', got {} part(s)",
                parts.len()
            )));
        };

        if tenant.is_empty() || name.is_empty() {
            return Err(ClaimsError::TenantUnresolved(
                "resource parts must be non-empty".to_string(),
            ));
        }

        let uuid = Uuid::parse_str(tenant)
            .map_err(|e| ClaimsError::TenantUnresolved(format!("invalid tenant id: {e}")))?;

        Ok(Self {
            tenant_id: TenantId::from_uuid(uuid),
            tenant_name: (*name).to_string(),
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("tenant unresolved: {0}")]
    TenantUnresolved(String),
}

impl From<ClaimsError> for SecurityError {
    fn from(value: ClaimsError) -> Self {
        match value {
            ClaimsError::TenantUnresolved(msg) => SecurityError::TenantUnresolved(msg),
        }
    }
}

/// A single claims validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl core::fmt::Display for FieldError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Deployment-specific acceptance rules for claims.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimsPolicy {
    allowed_issuers: Vec<String>,
}

impl ClaimsPolicy {
    pub fn new<I, S>(allowed_issuers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_issuers: allowed_issuers.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allows(&self, issuer: &str) -> bool {
        self.allowed_issuers.iter().any(|i| i == issuer)
    }

    pub fn allowed_issuers(&self) -> &[String] {
        &self.allowed_issuers
    }
}

fn deserialize_numeric_date<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumericDate {
        Int(i64),
        Float(f64),
    }

    Ok(match Option::<NumericDate>::deserialize(deserializer)? {
        Some(NumericDate::Int(v)) => v,
        Some(NumericDate::Float(v)) => v as i64,
        None => 0,
    })
}

/// `aud` may be a single string or an array of strings.
fn deserialize_audience<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Audience {
        Single(String),
        Multiple(Vec<String>),
    }

    Ok(match Option::<Audience>::deserialize(deserializer)? {
        Some(Audience::Single(s)) => vec![s],
        Some(Audience::Multiple(v)) => v,
        None => Vec::new(),
    })
}
