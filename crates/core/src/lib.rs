//! `warden-core`: identifiers, request correlation and the security error taxonomy.
//!
//! This crate contains **pure** primitives shared by every pipeline stage
//! (no HTTP, no IO).

pub mod correlation;
pub mod error;
pub mod id;

pub use correlation::CorrelationContext;
pub use error::{SecurityError, SecurityResult};
pub use id::{EventId, RequestId, SessionId, TenantId};
