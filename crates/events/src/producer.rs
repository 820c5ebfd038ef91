//! Event producer contract (transport only).
//!
//! A producer delivers an already-built [`Event`] to a named destination
//! (topic, stream, queue). It does not build events and does not decide
//! whether a delivery failure matters; that is the emitter's call.
//!
//! Implementations must be safe to share across request tasks.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::Event;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProducerError {
    #[error("producer is closed")]
    Closed,

    #[error("failed to encode event: {0}")]
    Encode(String),

    #[error("transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait EventProducer: Send + Sync {
    /// Deliver `event` to `destination`.
    async fn send(&self, destination: &str, event: &Event) -> Result<(), ProducerError>;

    /// Release transport resources. Sends after `close` fail with [`ProducerError::Closed`].
    async fn close(&self) -> Result<(), ProducerError>;
}

#[async_trait]
impl<P> EventProducer for Arc<P>
where
    P: EventProducer + ?Sized,
{
    async fn send(&self, destination: &str, event: &Event) -> Result<(), ProducerError> {
        (**self).send(destination, event).await
    }

    async fn close(&self) -> Result<(), ProducerError> {
        (**self).close().await
    }
}
