//! NATS transport for the courier producer.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Publishes envelopes and receives replies over core NATS subjects.
pub mod transport;

pub use transport::{Error, NatsTransport, NatsTransportOptions};
