//! Entitlement lookup: remote source plus the cache-aside resolver.

mod resolver;
mod source;

pub use resolver::{Decision, DecisionSource, EntitlementResolver, ResolveError};
pub use source::{
    DEFAULT_ENTITLEMENT_TIMEOUT, EntitlementSource, FetchOutcome, HttpEntitlementSource,
    SourceError,
};
