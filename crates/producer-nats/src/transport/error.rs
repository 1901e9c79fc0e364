use courier_producer::TransportError;
use thiserror::Error;

/// Errors raised by the NATS transport.
#[derive(Debug, Error)]
pub enum Error {
    /// Could not reach the server.
    #[error("failed to connect to NATS: {0}")]
    Connect(#[source] async_nats::ConnectError),

    /// Flushing a publish failed.
    #[error("failed to flush: {0}")]
    Flush(async_nats::client::FlushErrorKind),

    /// Publish attempted before connecting.
    #[error("transport is not connected")]
    NotConnected,

    /// Publish error.
    #[error("failed to publish: {0}")]
    Publish(async_nats::client::PublishErrorKind),

    /// The reply stream was already taken.
    #[error("reply stream already taken")]
    RepliesTaken,

    /// Subscribing a reply subject failed.
    #[error("failed to subscribe to `{subject}`")]
    Subscribe {
        /// The reply subject.
        subject: String,

        /// The underlying error.
        #[source]
        source: async_nats::SubscribeError,
    },
}

impl TransportError for Error {}
