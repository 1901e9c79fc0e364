//! Request/reply message producer over publish/subscribe transports.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Startup sequence: reply subscriptions, then connect.
pub mod bootstrap;

/// Correlation keys tie a reply to the request that caused it.
pub mod correlation;

/// Envelopes are the wire form of every outbound message.
pub mod envelope;

mod error;

/// The producer client.
pub mod producer;

/// Lifecycle states of a producer.
pub mod state;

/// Uniform bound on every send and emit.
pub mod timeout;

/// Topic naming helpers.
pub mod topic;

/// Transports move envelopes to and replies from a broker.
pub mod transport;

#[cfg(test)]
mod test_support;

pub use bootstrap::Bootstrap;
pub use correlation::CorrelationKey;
pub use envelope::{Envelope, Headers};
pub use error::Error;
pub use producer::{Producer, ProducerOptions, SendOptions};
pub use state::ProducerState;
pub use timeout::TimeoutPolicy;
pub use transport::{OutboundMessage, Reply, ReplyStream, Transport, TransportError};
