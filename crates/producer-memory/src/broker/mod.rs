use crate::transport::MemoryTransport;

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use courier_producer::{Envelope, Headers, OutboundMessage, Reply};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct BrokerState {
    consumers: HashMap<String, Vec<mpsc::UnboundedSender<Delivery>>>,
    reply_subscribers: HashMap<String, Vec<mpsc::UnboundedSender<Reply>>>,
    refuse_connections: bool,
}

/// An in-process broker.
///
/// Clones share the same topics. Messages are delivered to every consumer of
/// the exact topic they were published on; with no consumer they are dropped.
#[derive(Clone, Debug)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    accepting: Arc<watch::Sender<bool>>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Creates an empty broker that accepts connections and publishes.
    #[must_use]
    pub fn new() -> Self {
        let (accepting, _) = watch::channel(true);

        Self {
            state: Arc::new(Mutex::new(BrokerState::default())),
            accepting: Arc::new(accepting),
        }
    }

    /// Opens a new producer connection to this broker.
    #[must_use]
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport::new(self.clone())
    }

    /// Registers a consumer for `topic`.
    pub fn consume(&self, topic: &str) -> mpsc::UnboundedReceiver<Delivery> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.state
            .lock()
            .consumers
            .entry(topic.to_string())
            .or_default()
            .push(sender);

        debug!(%topic, "consumer registered");

        receiver
    }

    /// Holds publish acknowledgments until [`MemoryBroker::resume`].
    pub fn pause(&self) {
        self.accepting.send_replace(false);
    }

    /// Releases held publishes and acknowledges new ones immediately.
    pub fn resume(&self) {
        self.accepting.send_replace(true);
    }

    /// Whether publishes are currently held.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        !*self.accepting.borrow()
    }

    /// Makes subsequent connection attempts fail (or succeed again).
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse_connections = refuse;
    }

    pub(crate) fn refuses_connections(&self) -> bool {
        self.state.lock().refuse_connections
    }

    pub(crate) fn add_reply_subscriber(&self, reply_topic: String, sender: mpsc::UnboundedSender<Reply>) {
        self.state
            .lock()
            .reply_subscribers
            .entry(reply_topic)
            .or_default()
            .push(sender);
    }

    pub(crate) async fn publish(&self, topic: &str, message: OutboundMessage) {
        let mut accepting = self.accepting.subscribe();
        let _ = accepting.wait_for(|accepting| *accepting).await;

        let delivery = Delivery {
            topic: topic.to_string(),
            key: message.key.to_string(),
            payload: message.payload,
            headers: message.headers,
            reply_topic: message.reply_topic,
            broker: self.clone(),
        };

        let mut state = self.state.lock();
        match state.consumers.get_mut(topic) {
            Some(consumers) => {
                consumers.retain(|consumer| consumer.send(delivery.clone()).is_ok());
            }
            None => debug!(%topic, "no consumers; message dropped"),
        }
    }

    fn route_reply(&self, reply: Reply) -> bool {
        let mut state = self.state.lock();
        let Some(subscribers) = state.reply_subscribers.get_mut(&reply.topic) else {
            warn!(topic = %reply.topic, key = %reply.key, "no reply subscription; reply dropped");
            return false;
        };

        subscribers.retain(|subscriber| subscriber.send(reply.clone()).is_ok());
        !subscribers.is_empty()
    }
}

/// A message delivered to a consumer.
#[derive(Clone, Debug)]
pub struct Delivery {
    topic: String,
    key: String,
    payload: Bytes,
    headers: Option<Headers>,
    reply_topic: Option<String>,
    broker: MemoryBroker,
}

impl Delivery {
    /// The topic the message was published on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The correlation key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The encoded envelope.
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Headers supplied by the producer.
    #[must_use]
    pub const fn headers(&self) -> Option<&Headers> {
        self.headers.as_ref()
    }

    /// Where replies go. `None` for emitted events.
    #[must_use]
    pub fn reply_topic(&self) -> Option<&str> {
        self.reply_topic.as_deref()
    }

    /// Decodes the envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not an envelope of `T`.
    pub fn decode<T>(&self) -> Result<Envelope<T>, courier_producer::Error>
    where
        T: DeserializeOwned,
    {
        Envelope::decode(&self.payload)
    }

    /// Replies with `value`. Returns whether a subscriber received it.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be serialized.
    pub fn reply<T>(&self, value: &T) -> Result<bool, serde_json::Error>
    where
        T: Serialize,
    {
        let payload = Bytes::from(serde_json::to_vec(value)?);
        Ok(self.send_reply(payload, None))
    }

    /// Replies with a failure. Returns whether a subscriber received it.
    pub fn reply_error(&self, message: impl Into<String>) -> bool {
        self.send_reply(Bytes::new(), Some(message.into()))
    }

    fn send_reply(&self, payload: Bytes, error: Option<String>) -> bool {
        let Some(reply_topic) = self.reply_topic.clone() else {
            debug!(topic = %self.topic, "event has no reply topic");
            return false;
        };

        self.broker.route_reply(Reply {
            topic: reply_topic,
            key: self.key.clone(),
            payload,
            error,
        })
    }
}
