mod error;

pub use error::Error;

use crate::broker::MemoryBroker;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use courier_producer::topic;
use courier_producer::{OutboundMessage, Reply, ReplyStream, Transport};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

/// A producer connection to a [`MemoryBroker`].
#[derive(Clone, Debug)]
pub struct MemoryTransport {
    broker: MemoryBroker,
    connected: Arc<AtomicBool>,
    reply_tx: mpsc::UnboundedSender<Reply>,
    reply_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<Reply>>>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
}

impl MemoryTransport {
    /// Creates a disconnected transport for `broker`.
    #[must_use]
    pub fn new(broker: MemoryBroker) -> Self {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();

        Self {
            broker,
            connected: Arc::new(AtomicBool::new(false)),
            reply_tx,
            reply_rx: Arc::new(Mutex::new(Some(reply_rx))),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Reply topics subscribed so far, in subscription order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().clone()
    }

    /// Whether [`Transport::connect`] succeeded.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> Result<(), Error> {
        if self.connected() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    type Error = Error;

    async fn replies(&self) -> Result<ReplyStream, Self::Error> {
        let receiver = self.reply_rx.lock().take().ok_or(Error::RepliesTaken)?;

        Ok(UnboundedReceiverStream::new(receiver).boxed())
    }

    async fn subscribe_to_response_of(&self, topic: &str) -> Result<(), Self::Error> {
        let reply_topic = topic::reply_topic(topic);

        debug!(%reply_topic, "subscribing to replies");

        self.broker
            .add_reply_subscriber(reply_topic.clone(), self.reply_tx.clone());
        self.subscriptions.lock().push(reply_topic);

        Ok(())
    }

    async fn connect(&self) -> Result<(), Self::Error> {
        if self.broker.refuses_connections() {
            return Err(Error::ConnectionRefused);
        }

        self.connected.store(true, Ordering::SeqCst);

        Ok(())
    }

    async fn send(&self, topic: &str, message: OutboundMessage) -> Result<(), Self::Error> {
        self.ensure_connected()?;
        self.broker.publish(topic, message).await;

        Ok(())
    }

    async fn emit(&self, topic: &str, message: OutboundMessage) -> Result<(), Self::Error> {
        self.ensure_connected()?;
        self.broker.publish(topic, message).await;

        Ok(())
    }
}
