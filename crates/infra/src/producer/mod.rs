//! Infrastructure-backed event producers.
//!
//! The producer contract lives in `warden-events`; this module provides
//! transports that need external services.

#[cfg(feature = "redis")]
pub mod redis_streams;

#[cfg(feature = "redis")]
pub use redis_streams::RedisStreamsProducer;
