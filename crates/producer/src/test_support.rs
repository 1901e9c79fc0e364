//! Instrumented transport for unit tests.

use crate::envelope::Envelope;
use crate::transport::{OutboundMessage, Reply, ReplyStream, Transport, TransportError};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use rand::Rng;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(Clone, Debug, Error)]
pub enum FakeError {
    #[error("connection refused")]
    ConnectionRefused,

    #[error("replies already taken")]
    RepliesTaken,

    #[error("subscription rejected")]
    SubscriptionRejected,
}

impl TransportError for FakeError {}

#[derive(Clone, Debug)]
pub enum ReplyMode {
    /// Reply with the request value straight away.
    Echo,

    /// Reply with the request value after a random delay up to the bound.
    Jittered(Duration),

    /// Reply with the request value after a fixed delay.
    Delayed(Duration),

    /// Reply with a remote error.
    Fail(String),

    /// Never reply.
    Never,
}

#[derive(Clone, Copy, Debug)]
pub enum AckMode {
    Immediate,
    Never,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Replies,
    Subscribe(String),
    Connect,
    Send(String),
    Emit(String),
}

#[derive(Clone, Debug)]
pub struct FakeTransport {
    reply_mode: ReplyMode,
    ack_mode: AckMode,
    fail_connect: bool,
    fail_subscribe: bool,
    events: Arc<Mutex<Vec<Event>>>,
    sent: Arc<Mutex<Vec<(String, OutboundMessage)>>>,
    emitted: Arc<Mutex<Vec<(String, OutboundMessage)>>>,
    reply_tx: mpsc::UnboundedSender<Reply>,
    reply_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<Reply>>>>,
}

impl FakeTransport {
    pub fn new(reply_mode: ReplyMode, ack_mode: AckMode) -> Self {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();

        Self {
            reply_mode,
            ack_mode,
            fail_connect: false,
            fail_subscribe: false,
            events: Arc::new(Mutex::new(Vec::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            emitted: Arc::new(Mutex::new(Vec::new())),
            reply_tx,
            reply_rx: Arc::new(Mutex::new(Some(reply_rx))),
        }
    }

    pub fn failing_connect() -> Self {
        Self {
            fail_connect: true,
            ..Self::new(ReplyMode::Echo, AckMode::Immediate)
        }
    }

    pub fn failing_subscribe() -> Self {
        Self {
            fail_subscribe: true,
            ..Self::new(ReplyMode::Echo, AckMode::Immediate)
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn sent(&self) -> Vec<(String, OutboundMessage)> {
        self.sent.lock().clone()
    }

    pub fn emitted(&self) -> Vec<(String, OutboundMessage)> {
        self.emitted.lock().clone()
    }

    /// Whether the reply stream handed out by `replies` is still being read.
    pub fn replies_open(&self) -> bool {
        !self.reply_tx.is_closed()
    }

    fn reply_for(&self, message: &OutboundMessage) -> Option<(Reply, Duration)> {
        let reply_topic = message.reply_topic.clone()?;
        let value = Envelope::<Value>::decode(&message.payload)
            .map(|envelope| envelope.into_parts().1)
            .unwrap_or(Value::Null);
        let payload = Bytes::from(serde_json::to_vec(&value).unwrap_or_default());

        let mut reply = Reply {
            topic: reply_topic,
            key: message.key.to_string(),
            payload,
            error: None,
        };

        let delay = match &self.reply_mode {
            ReplyMode::Never => return None,
            ReplyMode::Echo => Duration::ZERO,
            ReplyMode::Delayed(delay) => *delay,
            ReplyMode::Jittered(max) => {
                let max_millis = u64::try_from(max.as_millis()).unwrap_or(u64::MAX).max(1);
                Duration::from_millis(rand::thread_rng().gen_range(0..max_millis))
            }
            ReplyMode::Fail(error) => {
                reply.error = Some(error.clone());
                reply.payload = Bytes::new();
                Duration::ZERO
            }
        };

        Some((reply, delay))
    }

    async fn acknowledge(&self) {
        if matches!(self.ack_mode, AckMode::Never) {
            futures::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    type Error = FakeError;

    async fn replies(&self) -> Result<ReplyStream, Self::Error> {
        self.events.lock().push(Event::Replies);

        let receiver = self.reply_rx.lock().take().ok_or(FakeError::RepliesTaken)?;
        Ok(UnboundedReceiverStream::new(receiver).boxed())
    }

    async fn subscribe_to_response_of(&self, topic: &str) -> Result<(), Self::Error> {
        if self.fail_subscribe {
            return Err(FakeError::SubscriptionRejected);
        }
        self.events.lock().push(Event::Subscribe(topic.to_string()));
        Ok(())
    }

    async fn connect(&self) -> Result<(), Self::Error> {
        // Yield so an out-of-order subscription would be observable.
        tokio::task::yield_now().await;
        if self.fail_connect {
            return Err(FakeError::ConnectionRefused);
        }
        self.events.lock().push(Event::Connect);
        Ok(())
    }

    async fn send(&self, topic: &str, message: OutboundMessage) -> Result<(), Self::Error> {
        self.events.lock().push(Event::Send(topic.to_string()));
        self.sent.lock().push((topic.to_string(), message.clone()));
        self.acknowledge().await;

        if let Some((reply, delay)) = self.reply_for(&message) {
            let reply_tx = self.reply_tx.clone();
            tokio::spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let _ = reply_tx.send(reply);
            });
        }

        Ok(())
    }

    async fn emit(&self, topic: &str, message: OutboundMessage) -> Result<(), Self::Error> {
        self.events.lock().push(Event::Emit(topic.to_string()));
        self.emitted.lock().push((topic.to_string(), message));
        self.acknowledge().await;
        Ok(())
    }
}
