use crate::Error;
use crate::correlation::CorrelationKey;
use crate::envelope::{Envelope, Headers};

use std::error::Error as StdError;
use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::Serialize;

/// Marker trait for transport errors
pub trait TransportError: Debug + StdError + Send + Sync + 'static {}

/// The shared receive path carrying replies for every subscribed topic.
pub type ReplyStream = BoxStream<'static, Reply>;

/// A message handed to a transport for dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Correlation key of the envelope.
    pub key: CorrelationKey,

    /// The JSON-encoded envelope.
    pub payload: Bytes,

    /// Caller-supplied headers, copied from the envelope.
    pub headers: Option<Headers>,

    /// Where the responder should reply. Only set for requests.
    pub reply_topic: Option<String>,
}

impl OutboundMessage {
    /// Encodes `envelope` for dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] if the envelope cannot be serialized.
    pub fn new<T>(envelope: &Envelope<T>, reply_topic: Option<String>) -> Result<Self, Error>
    where
        T: Serialize,
    {
        Ok(Self {
            key: envelope.key().clone(),
            payload: envelope.encode()?,
            headers: envelope.headers().cloned(),
            reply_topic,
        })
    }
}

/// A reply received on the shared receive path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    /// The reply topic it arrived on.
    pub topic: String,

    /// Correlation key echoed back by the responder.
    pub key: String,

    /// The JSON-encoded reply value.
    pub payload: Bytes,

    /// Set when the responder reported a failure instead of a value.
    pub error: Option<String>,
}

/// A connection to a broker.
///
/// Implementations must be safe for concurrent use: the producer multiplexes
/// every caller over one transport without locking.
#[async_trait]
pub trait Transport
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// The error type for the transport.
    type Error: TransportError;

    /// Takes the shared reply stream. May only be called once.
    async fn replies(&self) -> Result<ReplyStream, Self::Error>;

    /// Registers interest in replies to requests on `topic` (already normalized).
    async fn subscribe_to_response_of(&self, topic: &str) -> Result<(), Self::Error>;

    /// Establishes the broker connection.
    async fn connect(&self) -> Result<(), Self::Error>;

    /// Publishes a request. Returns once the broker acknowledged the publish.
    async fn send(&self, topic: &str, message: OutboundMessage) -> Result<(), Self::Error>;

    /// Publishes an event. Returns once the broker acknowledged the publish.
    async fn emit(&self, topic: &str, message: OutboundMessage) -> Result<(), Self::Error>;
}
