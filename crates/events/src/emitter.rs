//! Event construction and delivery.
//!
//! The emitter owns everything every event has in common (IDs, tenant, source,
//! timestamp, fixed payload fields) so pipeline stages only describe what is
//! specific to them via [`EventDraft`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;

use warden_core::{CorrelationContext, EventId, SecurityError};

use crate::envelope::{Event, EventDraft, Payload};
use crate::identity::ServiceIdentity;
use crate::producer::{EventProducer, ProducerError};

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmitError {
    #[error("event delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Producer(#[from] ProducerError),
}

impl From<EmitError> for SecurityError {
    fn from(value: EmitError) -> Self {
        SecurityError::EventDeliveryFailure(value.to_string())
    }
}

#[derive(Clone)]
pub struct EventEmitter {
    producer: Arc<dyn EventProducer>,
    destination: String,
    source: String,
    send_timeout: Duration,
}

impl core::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("destination", &self.destination)
            .field("source", &self.source)
            .field("send_timeout", &self.send_timeout)
            .finish_non_exhaustive()
    }
}

impl EventEmitter {
    pub fn new(
        producer: Arc<dyn EventProducer>,
        destination: impl Into<String>,
        identity: &ServiceIdentity,
    ) -> Self {
        Self {
            producer,
            destination: destination.into(),
            source: identity.principal_id(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Stamp a draft into a full [`Event`] without sending it.
    pub fn build(&self, correlation: &CorrelationContext, draft: EventDraft<'_>) -> Event {
        let EventDraft {
            event_type,
            claims,
            origin,
            message,
            fields,
            raw,
        } = draft;

        let tenant_id = claims.and_then(|c| c.tenant_id().ok());
        let subject = claims.map(|c| c.subject.clone()).unwrap_or_default();

        let mut payload = Payload::new();
        payload.insert("subject".to_string(), subject.into());
        payload.insert("path".to_string(), origin.path.into());
        payload.insert("user_agent".to_string(), origin.user_agent.into());
        payload.insert("remote_addr".to_string(), origin.remote_addr.into());
        payload.extend(fields);

        Event::new(
            EventId::new(),
            correlation.request_id(),
            correlation.session_id(),
            tenant_id,
            event_type,
            self.source.clone(),
            Utc::now(),
            message,
            payload,
        )
        .with_raw_fields(raw)
    }

    /// Build and deliver an event, bounded by the send timeout.
    pub async fn emit(
        &self,
        correlation: &CorrelationContext,
        draft: EventDraft<'_>,
    ) -> Result<EventId, EmitError> {
        let event = self.build(correlation, draft);
        let id = event.id();

        match tokio::time::timeout(self.send_timeout, self.producer.send(&self.destination, &event))
            .await
        {
            Ok(Ok(())) => Ok(id),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(EmitError::Timeout(self.send_timeout)),
        }
    }

    /// Like [`EventEmitter::emit`], but failures are logged and swallowed.
    pub async fn emit_best_effort(&self, correlation: &CorrelationContext, draft: EventDraft<'_>) {
        let event = self.build(correlation, draft);

        let result = tokio::time::timeout(
            self.send_timeout,
            self.producer.send(&self.destination, &event),
        )
        .await;

        let error = match result {
            Ok(Ok(())) => return,
            Ok(Err(e)) => EmitError::from(e),
            Err(_) => EmitError::Timeout(self.send_timeout),
        };

        tracing::warn!(
            event_type = %event.event_type(),
            destination = %self.destination,
            event_id = %event.id(),
            request_id = %event.request_id(),
            error = %error,
            "failed to deliver event"
        );
    }
}
