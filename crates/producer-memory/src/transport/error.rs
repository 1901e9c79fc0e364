use courier_producer::TransportError;
use thiserror::Error;

/// Errors raised by the in-memory transport.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// The broker refused the connection.
    #[error("connection refused by broker")]
    ConnectionRefused,

    /// Publish attempted before [`connect`](courier_producer::Transport::connect).
    #[error("transport is not connected")]
    NotConnected,

    /// The reply stream was already taken.
    #[error("reply stream already taken")]
    RepliesTaken,
}

impl TransportError for Error {}
