//! In-memory event producer for tests/dev.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, mpsc};

use async_trait::async_trait;

use crate::producer::{EventProducer, ProducerError};
use crate::Event;

/// One event as it was handed to the producer.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub destination: String,
    pub event: Event,
}

/// In-memory fan-out producer.
///
/// - No IO
/// - Every subscriber receives every delivery
/// - Dead subscribers are dropped on the next send
#[derive(Debug, Default)]
pub struct InMemoryProducer {
    subscribers: Mutex<Vec<mpsc::Sender<Delivery>>>,
    closed: AtomicBool,
}

impl InMemoryProducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every delivery made after this call.
    pub fn subscribe(&self) -> mpsc::Receiver<Delivery> {
        let (tx, rx) = mpsc::channel();

        // A poisoned lock yields a receiver that never gets anything.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }

        rx
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl EventProducer for InMemoryProducer {
    async fn send(&self, destination: &str, event: &Event) -> Result<(), ProducerError> {
        if self.is_closed() {
            return Err(ProducerError::Closed);
        }

        let delivery = Delivery {
            destination: destination.to_string(),
            event: event.clone(),
        };

        let mut subs = self
            .subscribers
            .lock()
            .map_err(|_| ProducerError::Transport("subscriber lock poisoned".to_string()))?;
        subs.retain(|tx| tx.send(delivery.clone()).is_ok());

        Ok(())
    }

    async fn close(&self) -> Result<(), ProducerError> {
        self.closed.store(true, Ordering::Release);
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.clear();
        }
        Ok(())
    }
}
