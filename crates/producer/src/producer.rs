use crate::Error;
use crate::bootstrap::Bootstrap;
use crate::envelope::{Envelope, Headers};
use crate::state::ProducerState;
use crate::timeout::{DEFAULT_TIMEOUT, TimeoutPolicy};
use crate::topic;
use crate::transport::{OutboundMessage, Reply, ReplyStream, Transport};

use std::collections::{HashMap, HashSet};
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{oneshot, watch};
use tokio::task::AbortHandle;
use tracing::{debug, warn};

type PendingMap = HashMap<String, oneshot::Sender<Reply>>;

/// Options for a producer. Read once at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProducerOptions {
    /// Upper bound on every `send` and `emit`.
    pub timeout: Duration,
}

impl Default for ProducerOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Per-call options for `send` and `emit`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Headers attached to the envelope verbatim.
    pub headers: Option<Headers>,
}

impl SendOptions {
    /// Options carrying `headers`.
    #[must_use]
    pub const fn with_headers(headers: Headers) -> Self {
        Self {
            headers: Some(headers),
        }
    }
}

/// A message producer with request/reply support.
///
/// Cheap to clone; clones share the transport, the lifecycle state and the
/// correlation table. Call [`Producer::bootstrap`] once before `send`/`emit`.
#[derive(Clone)]
pub struct Producer<Tr>
where
    Tr: Transport,
{
    inner: Arc<Inner<Tr>>,
}

struct Inner<Tr> {
    transport: Tr,
    timeout: TimeoutPolicy,
    state: watch::Sender<ProducerState>,
    pending: Arc<Mutex<PendingMap>>,
    reply_topics: RwLock<HashSet<String>>,
    dispatcher: Mutex<Option<AbortHandle>>,
}

impl<Tr> Drop for Inner<Tr> {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.get_mut().take() {
            dispatcher.abort();
        }
    }
}

// Removes the correlation entry however the call ends: reply, timeout, error or drop.
struct PendingEntry<'a> {
    pending: &'a Mutex<PendingMap>,
    key: String,
}

impl<'a> PendingEntry<'a> {
    fn register(pending: &'a Mutex<PendingMap>, key: String, sender: oneshot::Sender<Reply>) -> Self {
        pending.lock().insert(key.clone(), sender);
        Self { pending, key }
    }
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.key);
    }
}

impl<Tr> Producer<Tr>
where
    Tr: Transport,
{
    /// Creates a producer over `transport`. The producer starts `Uninitialized`.
    #[must_use]
    pub fn new(transport: Tr, options: ProducerOptions) -> Self {
        let (state, _) = watch::channel(ProducerState::Uninitialized);

        Self {
            inner: Arc::new(Inner {
                transport,
                timeout: TimeoutPolicy::new(options.timeout),
                state,
                pending: Arc::new(Mutex::new(HashMap::new())),
                reply_topics: RwLock::new(HashSet::new()),
                dispatcher: Mutex::new(None),
            }),
        }
    }

    /// Subscribes replies for `topics`, connects, and marks the producer ready.
    ///
    /// # Errors
    ///
    /// See [`Bootstrap::run`].
    pub async fn bootstrap<I, S>(&self, topics: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Bootstrap::new(topics).run(self).await
    }

    /// The current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ProducerState {
        *self.inner.state.borrow()
    }

    /// Whether bootstrap completed successfully.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == ProducerState::Ready
    }

    /// Waits until bootstrap finishes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] if bootstrap failed.
    pub async fn wait_ready(&self) -> Result<(), Error> {
        let mut receiver = self.inner.state.subscribe();
        let state = receiver
            .wait_for(|state| state.is_terminal())
            .await
            .map_or(ProducerState::Failed, |state| *state);

        match state {
            ProducerState::Ready => Ok(()),
            other => Err(Error::NotReady(other)),
        }
    }

    /// The configured timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.inner.timeout.duration()
    }

    /// The underlying transport.
    #[must_use]
    pub fn transport(&self) -> &Tr {
        &self.inner.transport
    }

    /// Number of requests awaiting a reply.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Sends a request on `topic` and waits for the correlated reply.
    ///
    /// Dispatch and wait together are bounded by the configured timeout.
    /// Nothing is retried.
    ///
    /// # Errors
    ///
    /// - [`Error::NotReady`] before bootstrap completed.
    /// - [`Error::ReplyTopicNotSubscribed`] if replies for `topic` were not subscribed at bootstrap.
    /// - [`Error::Timeout`] if no reply arrived in time.
    /// - [`Error::Remote`] if the responder reported a failure.
    /// - [`Error::Decode`] if the reply is not a valid `R`.
    pub async fn send<T, R>(
        &self,
        topic: &str,
        value: T,
        options: Option<SendOptions>,
    ) -> Result<R, Error>
    where
        T: Serialize + Send,
        R: DeserializeOwned,
    {
        self.ensure_ready()?;

        let reply_topic = topic::reply_topic(topic);
        if !self.inner.reply_topics.read().contains(&reply_topic) {
            return Err(Error::ReplyTopicNotSubscribed(topic.to_string()));
        }

        let message = {
            let envelope = Envelope::build(value, options.and_then(|options| options.headers));
            OutboundMessage::new(&envelope, Some(reply_topic))?
        };

        let (sender, receiver) = oneshot::channel();
        let _entry = PendingEntry::register(
            &self.inner.pending,
            message.key.as_str().to_string(),
            sender,
        );
        let key = message.key.clone();

        debug!(%topic, %key, "sending request");

        let result = self
            .inner
            .timeout
            .bound(async {
                self.inner
                    .transport
                    .send(topic, message)
                    .await
                    .map_err(|e| Error::Transport(Box::new(e)))?;

                receiver.await.map_err(|_| Error::ReplyChannelClosed)
            })
            .await;

        let reply = match result {
            Ok(Ok(reply)) => reply,
            Ok(Err(error)) => return Err(error),
            Err(error) => {
                warn!(%topic, %key, "request timed out");
                return Err(error);
            }
        };

        if let Some(error) = reply.error {
            return Err(Error::Remote(error));
        }

        serde_json::from_slice(&reply.payload).map_err(Error::Decode)
    }

    /// Publishes `value` on `topic` without waiting for a reply.
    ///
    /// Only the transport acknowledgment is awaited, bounded by the same
    /// timeout as [`Producer::send`].
    ///
    /// # Errors
    ///
    /// - [`Error::NotReady`] before bootstrap completed.
    /// - [`Error::Timeout`] if the acknowledgment did not arrive in time.
    /// - [`Error::Transport`] if the transport rejected the publish.
    pub async fn emit<T>(&self, topic: &str, value: T, options: Option<SendOptions>) -> Result<(), Error>
    where
        T: Serialize + Send,
    {
        self.ensure_ready()?;

        let message = {
            let envelope = Envelope::build(value, options.and_then(|options| options.headers));
            OutboundMessage::new(&envelope, None)?
        };

        debug!(%topic, key = %message.key, "emitting event");

        self.inner
            .timeout
            .bound(self.inner.transport.emit(topic, message))
            .await?
            .map_err(|e| Error::Transport(Box::new(e)))
    }

    fn ensure_ready(&self) -> Result<(), Error> {
        match self.state() {
            ProducerState::Ready => Ok(()),
            state => Err(Error::NotReady(state)),
        }
    }

    pub(crate) fn begin_bootstrap(&self) -> Result<(), Error> {
        let started = self.inner.state.send_if_modified(|state| {
            if *state == ProducerState::Uninitialized {
                *state = ProducerState::Subscribing;
                true
            } else {
                false
            }
        });

        if started {
            Ok(())
        } else {
            Err(Error::AlreadyBootstrapped)
        }
    }

    pub(crate) fn set_state(&self, state: ProducerState) {
        self.inner.state.send_replace(state);
    }

    pub(crate) async fn start_reply_dispatcher(&self) -> Result<(), Error> {
        let replies = self
            .inner
            .transport
            .replies()
            .await
            .map_err(|e| Error::Transport(Box::new(e)))?;

        let dispatcher = Self::spawn_reply_dispatcher(replies, self.inner.pending.clone());
        if let Some(previous) = self.inner.dispatcher.lock().replace(dispatcher) {
            previous.abort();
        }

        Ok(())
    }

    pub(crate) fn stop_reply_dispatcher(&self) {
        if let Some(dispatcher) = self.inner.dispatcher.lock().take() {
            dispatcher.abort();
        }
    }

    pub(crate) async fn subscribe_replies(&self, topic: &str) -> Result<(), Error> {
        self.inner
            .transport
            .subscribe_to_response_of(topic)
            .await
            .map_err(|e| Error::Subscribe {
                topic: topic.to_string(),
                source: Box::new(e),
            })?;

        self.inner.reply_topics.write().insert(topic::reply_topic(topic));

        Ok(())
    }

    fn spawn_reply_dispatcher(mut replies: ReplyStream, pending: Arc<Mutex<PendingMap>>) -> AbortHandle {
        tokio::spawn(async move {
            while let Some(reply) = replies.next().await {
                let sender = pending.lock().remove(&reply.key);

                match sender {
                    Some(sender) => {
                        if sender.send(reply).is_err() {
                            debug!("requester gone before reply was delivered");
                        }
                    }
                    None => {
                        debug!(key = %reply.key, topic = %reply.topic, "discarding reply with no pending request");
                    }
                }
            }

            debug!("reply stream closed");
        })
        .abort_handle()
    }
}

impl<Tr> Debug for Producer<Tr>
where
    Tr: Transport,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("transport", &self.inner.transport)
            .field("state", &self.state())
            .field("timeout", &self.timeout())
            .field("pending_requests", &self.pending_requests())
            .finish_non_exhaustive()
    }
}
