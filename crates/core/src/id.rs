//! Strongly-typed identifiers used across the pipeline.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SecurityError;

/// Identifier of a tenant (the organizational scope a subject acts within).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(Uuid);

/// Identifier of a single inbound request (`X-Request-ID`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

/// Identifier of a client session (`X-Session-ID`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

/// Identifier of an emitted security/audit/usage event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

macro_rules! impl_uuid_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Generate a fresh identifier (UUIDv7, time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Keep `raw` when it is a valid UUID, otherwise generate a new identifier.
            pub fn parse_or_new(raw: Option<&str>) -> Self {
                raw.and_then(|s| Uuid::parse_str(s.trim()).ok())
                    .map(Self)
                    .unwrap_or_else(Self::new)
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = SecurityError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| SecurityError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(TenantId, "TenantId");
impl_uuid_newtype!(RequestId, "RequestId");
impl_uuid_newtype!(SessionId, "SessionId");
impl_uuid_newtype!(EventId, "EventId");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_or_new_keeps_valid_uuid() {
        let raw = "3fae3c4e-2b1f-4d0c-9a43-5f6c1e7b8a90";
        let id = RequestId::parse_or_new(Some(raw));
        assert_eq!(id.to_string(), raw);
    }

    #[test]
    fn parse_or_new_replaces_garbage_and_missing() {
        let a = RequestId::parse_or_new(Some("not-a-uuid"));
        let b = RequestId::parse_or_new(None);
        let c = RequestId::parse_or_new(Some(""));

        assert_ne!(a, b);
        assert_ne!(b, c);
        assert!(!a.as_uuid().is_nil());
    }

    #[test]
    fn from_str_reports_type_name() {
        let err = "nope".parse::<TenantId>().unwrap_err();
        assert!(err.to_string().contains("TenantId"));
    }
}
