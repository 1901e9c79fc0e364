//! In-memory broker and transport for the producer.
//!
//! Routes messages between producers and responders inside one process. Used
//! for tests and local development.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// The shared in-process broker.
pub mod broker;

/// A producer connection to the broker.
pub mod transport;

pub use broker::{Delivery, MemoryBroker};
pub use transport::{Error, MemoryTransport};
