//! Security, audit and usage events: envelope, producer contract and emitter.

pub mod emitter;
pub mod envelope;
pub mod event;
pub mod identity;
pub mod in_memory;
pub mod producer;

pub use emitter::{EmitError, EventEmitter};
pub use envelope::{Event, EventDraft, Payload, RawFields, RawJson, RequestOrigin};
pub use event::EventType;
pub use identity::ServiceIdentity;
pub use in_memory::{Delivery, InMemoryProducer};
pub use producer::{EventProducer, ProducerError};
