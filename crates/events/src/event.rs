use serde::{Deserialize, Serialize};

/// Kind of pipeline outcome an [`Event`](crate::Event) describes.
///
/// The wire names (`login.success`, ...) are a stable contract with consumers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "login.success")]
    LoginSuccess,
    #[serde(rename = "login.failure")]
    LoginFailure,
    #[serde(rename = "authz.denied")]
    AuthzDenied,
    #[serde(rename = "authz.error")]
    AuthzError,
    #[serde(rename = "audit.log")]
    AuditLog,
    #[serde(rename = "usage.log")]
    UsageLog,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoginSuccess => "login.success",
            Self::LoginFailure => "login.failure",
            Self::AuthzDenied => "authz.denied",
            Self::AuthzError => "authz.error",
            Self::AuditLog => "audit.log",
            Self::UsageLog => "usage.log",
        }
    }
}

impl core::fmt::Display for EventType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
