//! HTTP security pipeline: correlation, authentication, authorization, audit
//! and usage stages as axum middleware.

pub mod app;
pub mod context;
pub mod errors;
pub mod middleware;

pub use app::{Pipeline, SetupError, UsageSettings};
pub use context::PrincipalContext;
