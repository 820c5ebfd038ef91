//! Cache-aside entitlement resolution.
//!
//! 1. Look the subject up in the cache; a hit that grants access short-circuits.
//! 2. Otherwise (miss, unreadable cache, or a hit that does not grant access)
//!    ask the entitlement service, forwarding the caller's credentials.
//! 3. A 200 body is cached *before* membership is evaluated. A 5xx status is
//!    an upstream failure; any other status is a refusal. Neither is cached.
//!
//! There is no single-flight: concurrent misses for one subject each perform
//! their own live lookup and the last cache write wins.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use thiserror::Error;
use tracing::{debug, info, warn};

use warden_auth::{Entitlement, EntitlementSet, RequiredEntitlements};
use warden_core::SecurityError;

use crate::cache::EntitlementCache;
use crate::entitlements::source::{EntitlementSource, FetchOutcome, SourceError};

/// Where an allow decision was made.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DecisionSource {
    Cache,
    Live,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed {
        source: DecisionSource,
        matched: Entitlement,
    },
    /// The subject's entitlements hold none of the required names.
    NotMember,
    /// The entitlement service answered with a non-200, non-5xx status.
    Refused { status: u16 },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("entitlement service unavailable: {0}")]
    EntitlementApi(#[from] SourceError),

    #[error("entitlement service failed with status {0}")]
    UpstreamStatus(u16),
}

impl From<ResolveError> for SecurityError {
    fn from(value: ResolveError) -> Self {
        SecurityError::entitlement_api(value.to_string())
    }
}

const GRACE_CAPACITY: u64 = 100_000;

pub struct EntitlementResolver {
    cache: Arc<dyn EntitlementCache>,
    source: Arc<dyn EntitlementSource>,
    negative_grace: Option<Duration>,
    /// Subjects looked up live within the grace window; entries expire with it.
    last_live: Option<Cache<String, ()>>,
}

impl core::fmt::Debug for EntitlementResolver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EntitlementResolver")
            .field("negative_grace", &self.negative_grace)
            .finish_non_exhaustive()
    }
}

impl EntitlementResolver {
    pub fn new(cache: Arc<dyn EntitlementCache>, source: Arc<dyn EntitlementSource>) -> Self {
        Self {
            cache,
            source,
            negative_grace: None,
            last_live: None,
        }
    }

    /// Trust a cached denial for `grace` after the last live lookup of that
    /// subject instead of re-asking the entitlement service. Disabled by default.
    pub fn with_negative_grace(mut self, grace: Option<Duration>) -> Self {
        self.negative_grace = grace.filter(|g| !g.is_zero());
        self.last_live = self.negative_grace.map(|grace| {
            Cache::builder()
                .max_capacity(GRACE_CAPACITY)
                .time_to_live(grace)
                .build()
        });
        self
    }

    pub async fn resolve(
        &self,
        subject: &str,
        authorization: &str,
        required: &RequiredEntitlements,
    ) -> Result<Decision, ResolveError> {
        match self.cache.get(subject).await {
            Ok(Some(cached)) => {
                if let Some(matched) = evaluate(&cached, required) {
                    info!(subject, entitlement = %matched.name, "entitlement granted from cache");
                    return Ok(Decision::Allowed {
                        source: DecisionSource::Cache,
                        matched,
                    });
                }
                if self.within_grace(subject).await {
                    debug!(subject, "cached denial within grace window");
                    return Ok(Decision::NotMember);
                }
                debug!(subject, "cached entitlements do not grant access; refreshing");
            }
            Ok(None) => debug!(subject, "entitlement cache miss"),
            Err(e) => warn!(subject, error = %e, "entitlement cache read failed; treating as miss"),
        }

        let body = match self.source.fetch(authorization).await? {
            FetchOutcome::Refused(status) if status >= 500 => {
                return Err(ResolveError::UpstreamStatus(status));
            }
            FetchOutcome::Refused(status) => {
                warn!(subject, status, "entitlement service refused request");
                return Ok(Decision::Refused { status });
            }
            FetchOutcome::Granted(body) => body,
        };

        if let Err(e) = self.cache.set(subject, body.clone()).await {
            warn!(subject, error = %e, "entitlement cache write failed");
        }
        self.record_live(subject).await;

        match evaluate(&body, required) {
            Some(matched) => {
                info!(subject, entitlement = %matched.name, "entitlement granted");
                Ok(Decision::Allowed {
                    source: DecisionSource::Live,
                    matched,
                })
            }
            None => Ok(Decision::NotMember),
        }
    }

    async fn within_grace(&self, subject: &str) -> bool {
        match &self.last_live {
            Some(last_live) => last_live.get(subject).await.is_some(),
            None => false,
        }
    }

    async fn record_live(&self, subject: &str) {
        if let Some(last_live) = &self.last_live {
            last_live.insert(subject.to_string(), ()).await;
        }
    }
}

/// First required entitlement held, or `None`. An unparsable body counts as
/// no membership.
fn evaluate(body: &[u8], required: &RequiredEntitlements) -> Option<Entitlement> {
    match EntitlementSet::from_json(body) {
        Ok(set) => set.first_match(required).cloned(),
        Err(e) => {
            warn!(error = %e, "failed to decode entitlement response");
            None
        }
    }
}
