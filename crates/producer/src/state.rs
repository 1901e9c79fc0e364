use std::fmt;

/// Where a producer is in its lifecycle.
///
/// `Uninitialized -> Subscribing -> Connecting -> Ready`. A failed bootstrap
/// ends in `Failed`; neither `Ready` nor `Failed` is ever left.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProducerState {
    /// Bootstrap has not started.
    Uninitialized,

    /// Registering reply subscriptions.
    Subscribing,

    /// Waiting for the transport connection.
    Connecting,

    /// Connected; `send` and `emit` are accepted.
    Ready,

    /// Bootstrap failed. The producer rejects all calls.
    Failed,
}

impl ProducerState {
    /// Whether the state can no longer change.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

impl fmt::Display for ProducerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Subscribing => "subscribing",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}
