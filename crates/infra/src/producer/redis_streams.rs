//! Redis Streams-backed event producer.
//!
//! Each event is appended with `XADD <destination> [MAXLEN ~ n] * ...` using
//! flat fields so consumers can filter without decoding the payload:
//! `event_id`, `event_type`, `tenant_id` (empty when unresolved),
//! `request_id` and `payload` (the full event as JSON).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::instrument;

use warden_events::{Event, EventProducer, ProducerError};

#[derive(Debug, Clone)]
pub struct RedisStreamsProducer {
    client: Arc<redis::Client>,
    max_len: Option<usize>,
    closed: Arc<AtomicBool>,
}

impl RedisStreamsProducer {
    /// `redis_url` e.g. "redis://localhost:6379".
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, ProducerError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| ProducerError::Transport(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            max_len: None,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Cap stream length (approximate trimming).
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    fn xadd(&self, destination: &str, event: &Event) -> Result<redis::Cmd, ProducerError> {
        let payload =
            serde_json::to_string(event).map_err(|e| ProducerError::Encode(e.to_string()))?;
        let tenant_id = event
            .tenant_id()
            .map(|t| t.to_string())
            .unwrap_or_default();

        let mut cmd = redis::cmd("XADD");
        cmd.arg(destination);
        if let Some(max_len) = self.max_len {
            cmd.arg("MAXLEN").arg("~").arg(max_len);
        }
        cmd.arg("*")
            .arg("event_id")
            .arg(event.id().to_string())
            .arg("event_type")
            .arg(event.event_type().as_str())
            .arg("tenant_id")
            .arg(tenant_id)
            .arg("request_id")
            .arg(event.request_id().to_string())
            .arg("payload")
            .arg(payload);
        Ok(cmd)
    }
}

#[async_trait]
impl EventProducer for RedisStreamsProducer {
    #[instrument(
        skip(self, event),
        fields(event_id = %event.id(), event_type = %event.event_type()),
        err
    )]
    async fn send(&self, destination: &str, event: &Event) -> Result<(), ProducerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ProducerError::Closed);
        }

        let cmd = self.xadd(destination, event)?;
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| ProducerError::Transport(e.to_string()))?;

        let _: String = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| ProducerError::Transport(format!("XADD failed: {e}")))?;

        Ok(())
    }

    async fn close(&self) -> Result<(), ProducerError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
