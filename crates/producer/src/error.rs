use crate::state::ProducerState;

use std::error::Error as StdError;
use std::time::Duration;

use thiserror::Error;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors that can occur while bootstrapping or using a producer.
#[derive(Debug, Error)]
pub enum Error {
    /// Bootstrap was already run on this producer.
    #[error("bootstrap has already run")]
    AlreadyBootstrapped,

    /// The transport failed to connect. Fatal to startup.
    #[error("failed to connect transport: {0}")]
    Connect(#[source] BoxError),

    /// A reply could not be decoded into the requested type.
    #[error("failed to decode reply: {0}")]
    Decode(#[source] serde_json::Error),

    /// An envelope could not be encoded.
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    /// Operation attempted before bootstrap completed.
    #[error("producer is not ready (state: {0})")]
    NotReady(ProducerState),

    /// The responder reported a failure instead of a reply.
    #[error("remote handler failed: {0}")]
    Remote(String),

    /// The correlation entry was dropped before a reply arrived.
    #[error("reply channel closed before a reply arrived")]
    ReplyChannelClosed,

    /// `send` on a topic whose replies were never subscribed.
    #[error("no reply subscription for topic {0}")]
    ReplyTopicNotSubscribed(String),

    /// Registering a reply subscription failed.
    #[error("failed to subscribe to replies of {topic}: {source}")]
    Subscribe {
        /// The normalized topic.
        topic: String,

        /// The transport error.
        source: BoxError,
    },

    /// No reply or acknowledgment within the configured timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The transport failed to dispatch a message.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),
}
