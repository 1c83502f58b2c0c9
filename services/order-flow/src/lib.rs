//! Order flow: stream ingress and egress around the matching engine
//!
//! The broker abstraction partitions each topic by key, mirrors manual offset
//! commits, and redelivers uncommitted records, which gives the dispatcher
//! at-least-once delivery with per-symbol ordering. On top of it sit:
//! - the **ingress dispatcher**: consumes new-order events, enforces
//!   idempotency, dispatches to the coordinator, acknowledges or dead-letters;
//! - the **egress publisher**: emits order-status events (keyed by user) and
//!   trade events (keyed by symbol), fire-and-forget;
//! - the **dead letter handler**: marks orders FAILED from the input DLQ and
//!   drains the trade DLQ.

pub mod bus;
pub mod consumer;
pub mod dlq;
pub mod producer;

pub use bus::{topics, BusError, InProcessBroker, Record};
pub use consumer::{Disposition, DispatcherConfig, IngressDispatcher};
pub use dlq::{DeadLetterHandler, DlqStats};
pub use producer::{EgressPublisher, OrderInputProducer};
