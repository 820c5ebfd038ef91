//! Infrastructure layer: entitlement cache and service client, the cache-aside
//! resolver, configuration and optional Redis adapters.

pub mod cache;
pub mod config;
pub mod entitlements;
pub mod producer;

pub use cache::{CacheError, EntitlementCache, InMemoryEntitlementCache};
pub use config::{ConfigError, WardenConfig};
pub use entitlements::{
    Decision, DecisionSource, EntitlementResolver, EntitlementSource, FetchOutcome,
    HttpEntitlementSource, ResolveError, SourceError,
};
