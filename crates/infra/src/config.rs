//! Process configuration from `WARDEN_*` environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `WARDEN_SERVICE_DOMAIN` / `_GROUP` / `_NAME` / `_VERSION` | `platform` / `security` / `warden` / `v1` |
//! | `WARDEN_PRODUCT_ID` | nil UUID |
//! | `WARDEN_MEMORY_LIMIT_MB` | `0` |
//! | `WARDEN_ENTITLEMENT_URL` | required |
//! | `WARDEN_ENTITLEMENT_TIMEOUT_MS` | `5000` |
//! | `WARDEN_REQUIRED_ENTITLEMENTS` | empty (comma separated) |
//! | `WARDEN_ALLOWED_ISSUERS` | empty (comma separated) |
//! | `WARDEN_EVENT_TOPIC` | `security-events` |
//! | `WARDEN_EVENT_SEND_TIMEOUT_MS` | `2000` |
//! | `WARDEN_AUDIT_BODY_LIMIT` | `1048576` |
//! | `WARDEN_CACHE_TTL_SECS` | `600` |
//! | `WARDEN_CACHE_MAX_BYTES` | `67108864` |
//! | `WARDEN_NEGATIVE_GRACE_SECS` | unset (disabled) |
//! | `WARDEN_BIND_ADDR` | `0.0.0.0:8080` |
//! | `WARDEN_JWT_PUBLIC_KEY_PEM` | unset |
//! | `WARDEN_REDIS_URL` | unset |

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use warden_auth::{ClaimsPolicy, RequiredEntitlements};
use warden_events::ServiceIdentity;

pub const DEFAULT_AUDIT_BODY_LIMIT: usize = 1024 * 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} is invalid: {message}")]
    Invalid { var: &'static str, message: String },
}

#[derive(Debug, Clone)]
pub struct WardenConfig {
    pub service: ServiceIdentity,
    pub product_id: Uuid,
    pub memory_limit_mb: u32,
    pub entitlement_url: String,
    pub entitlement_timeout: Duration,
    pub required_entitlements: RequiredEntitlements,
    pub allowed_issuers: Vec<String>,
    pub event_topic: String,
    pub event_send_timeout: Duration,
    pub audit_body_limit: usize,
    pub cache_ttl: Duration,
    pub cache_max_bytes: usize,
    pub negative_grace: Option<Duration>,
    pub bind_addr: SocketAddr,
    pub public_key_pem: Option<String>,
    pub redis_url: Option<String>,
}

impl WardenConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let service = ServiceIdentity::new(
            var("WARDEN_SERVICE_DOMAIN").unwrap_or_else(|| "platform".to_string()),
            var("WARDEN_SERVICE_GROUP").unwrap_or_else(|| "security".to_string()),
            var("WARDEN_SERVICE_NAME").unwrap_or_else(|| "warden".to_string()),
            var("WARDEN_SERVICE_VERSION").unwrap_or_else(|| "v1".to_string()),
        );

        let entitlement_url =
            var("WARDEN_ENTITLEMENT_URL").ok_or(ConfigError::Missing("WARDEN_ENTITLEMENT_URL"))?;

        Ok(Self {
            service,
            product_id: parse_or(var("WARDEN_PRODUCT_ID"), "WARDEN_PRODUCT_ID", Uuid::nil())?,
            memory_limit_mb: parse_or(var("WARDEN_MEMORY_LIMIT_MB"), "WARDEN_MEMORY_LIMIT_MB", 0)?,
            entitlement_url,
            entitlement_timeout: Duration::from_millis(parse_or(
                var("WARDEN_ENTITLEMENT_TIMEOUT_MS"),
                "WARDEN_ENTITLEMENT_TIMEOUT_MS",
                5_000,
            )?),
            required_entitlements: RequiredEntitlements::new(split_list(var(
                "WARDEN_REQUIRED_ENTITLEMENTS",
            ))),
            allowed_issuers: split_list(var("WARDEN_ALLOWED_ISSUERS")),
            event_topic: var("WARDEN_EVENT_TOPIC").unwrap_or_else(|| "security-events".to_string()),
            event_send_timeout: Duration::from_millis(parse_or(
                var("WARDEN_EVENT_SEND_TIMEOUT_MS"),
                "WARDEN_EVENT_SEND_TIMEOUT_MS",
                2_000,
            )?),
            audit_body_limit: parse_or(
                var("WARDEN_AUDIT_BODY_LIMIT"),
                "WARDEN_AUDIT_BODY_LIMIT",
                DEFAULT_AUDIT_BODY_LIMIT,
            )?,
            cache_ttl: Duration::from_secs(parse_or(
                var("WARDEN_CACHE_TTL_SECS"),
                "WARDEN_CACHE_TTL_SECS",
                600,
            )?),
            cache_max_bytes: parse_or(
                var("WARDEN_CACHE_MAX_BYTES"),
                "WARDEN_CACHE_MAX_BYTES",
                64 * 1024 * 1024,
            )?,
            negative_grace: var("WARDEN_NEGATIVE_GRACE_SECS")
                .map(|raw| parse("WARDEN_NEGATIVE_GRACE_SECS", &raw).map(Duration::from_secs))
                .transpose()?,
            bind_addr: parse_or(
                var("WARDEN_BIND_ADDR"),
                "WARDEN_BIND_ADDR",
                SocketAddr::from(([0, 0, 0, 0], 8080)),
            )?,
            public_key_pem: var("WARDEN_JWT_PUBLIC_KEY_PEM"),
            redis_url: var("WARDEN_REDIS_URL"),
        })
    }

    pub fn claims_policy(&self) -> ClaimsPolicy {
        ClaimsPolicy::new(self.allowed_issuers.iter().cloned())
    }
}

fn parse<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        message: e.to_string(),
    })
}

fn parse_or<T>(raw: Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    match raw {
        Some(raw) => parse(var, &raw),
        None => Ok(default),
    }
}

fn split_list(raw: Option<String>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<WardenConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WardenConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_only_required_vars_are_set() {
        let cfg = config(&[("WARDEN_ENTITLEMENT_URL", "http://ent/api")]).unwrap();

        assert_eq!(cfg.entitlement_timeout, Duration::from_secs(5));
        assert_eq!(cfg.audit_body_limit, 1024 * 1024);
        assert_eq!(cfg.event_topic, "security-events");
        assert_eq!(cfg.negative_grace, None);
        assert!(cfg.required_entitlements.is_empty());
        assert_eq!(cfg.service.principal_id(), "platform.security.warden.v1");
        assert!(cfg.product_id.is_nil());
    }

    #[test]
    fn entitlement_url_is_required() {
        assert_eq!(
            config(&[]).unwrap_err(),
            ConfigError::Missing("WARDEN_ENTITLEMENT_URL")
        );
    }

    #[test]
    fn lists_are_trimmed_and_split() {
        let cfg = config(&[
            ("WARDEN_ENTITLEMENT_URL", "http://ent/api"),
            ("WARDEN_REQUIRED_ENTITLEMENTS", " admin , editor,,"),
            ("WARDEN_ALLOWED_ISSUERS", "https://a.test,https://b.test"),
        ])
        .unwrap();

        assert_eq!(cfg.required_entitlements.names(), vec!["admin", "editor"]);
        assert!(cfg.claims_policy().allows("https://b.test"));
        assert!(!cfg.claims_policy().allows("https://c.test"));
    }

    #[test]
    fn malformed_numbers_are_typed_errors() {
        let err = config(&[
            ("WARDEN_ENTITLEMENT_URL", "http://ent/api"),
            ("WARDEN_CACHE_TTL_SECS", "ten"),
        ])
        .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::Invalid { var: "WARDEN_CACHE_TTL_SECS", .. }
        ));
    }

    #[test]
    fn grace_and_identity_overrides() {
        let cfg = config(&[
            ("WARDEN_ENTITLEMENT_URL", "http://ent/api"),
            ("WARDEN_NEGATIVE_GRACE_SECS", "30"),
            ("WARDEN_SERVICE_NAME", "orders"),
            ("WARDEN_SERVICE_VERSION", "3.2.0"),
            ("WARDEN_PRODUCT_ID", "0b7e1f5a-9d1c-4f0e-8c59-2d1a6b3e4f70"),
        ])
        .unwrap();

        assert_eq!(cfg.negative_grace, Some(Duration::from_secs(30)));
        assert_eq!(cfg.service.principal_id(), "platform.security.orders.v3");
        assert_eq!(
            cfg.product_id.to_string(),
            "0b7e1f5a-9d1c-4f0e-8c59-2d1a6b3e4f70"
        );
    }
}
