mod error;

pub use error::Error;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_nats::{Client, ConnectOptions, HeaderMap, Subscriber};
use async_trait::async_trait;
use bytes::Bytes;
use courier_producer::topic;
use courier_producer::{OutboundMessage, Reply, ReplyStream, Transport};
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

/// Header carrying the correlation key of a request and of its reply.
pub const CORRELATION_KEY_HEADER: &str = "Correlation-Key";

/// Header naming the subject a responder should reply on.
pub const REPLY_TOPIC_HEADER: &str = "Reply-Topic";

/// Header a responder sets instead of a value when handling failed.
pub const REPLY_ERROR_HEADER: &str = "Reply-Error";

/// Options for [`NatsTransport`].
#[derive(Clone, Debug)]
pub struct NatsTransportOptions {
    /// Server URL, e.g. `nats://localhost:4222`.
    pub url: String,

    /// Connection name reported to the server.
    pub name: String,

    /// How long a single connection attempt may take.
    pub connection_timeout: Duration,
}

impl Default for NatsTransportOptions {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            name: "courier-producer".to_string(),
            connection_timeout: Duration::from_secs(5),
        }
    }
}

/// A producer connection to a NATS server.
///
/// Reply subjects registered before [`Transport::connect`] are subscribed as
/// part of connecting, so no reply can arrive before its subscription.
#[derive(Clone, Debug)]
pub struct NatsTransport {
    options: NatsTransportOptions,
    client: Arc<RwLock<Option<Client>>>,
    reply_subjects: Arc<Mutex<Vec<String>>>,
    reply_tx: mpsc::UnboundedSender<Reply>,
    reply_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<Reply>>>>,
}

impl NatsTransport {
    /// Creates a disconnected transport.
    #[must_use]
    pub fn new(options: NatsTransportOptions) -> Self {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();

        Self {
            options,
            client: Arc::new(RwLock::new(None)),
            reply_subjects: Arc::new(Mutex::new(Vec::new())),
            reply_tx,
            reply_rx: Arc::new(Mutex::new(Some(reply_rx))),
        }
    }

    fn client(&self) -> Result<Client, Error> {
        self.client.read().clone().ok_or(Error::NotConnected)
    }

    async fn subscribe_reply_subject(client: &Client, subject: String) -> Result<Subscriber, Error> {
        let subscriber = client
            .subscribe(subject.clone())
            .await
            .map_err(|source| Error::Subscribe {
                subject: subject.clone(),
                source,
            })?;

        debug!(%subject, "subscribed to replies");

        Ok(subscriber)
    }

    fn spawn_forwarder(mut subscriber: Subscriber, reply_tx: mpsc::UnboundedSender<Reply>) {
        tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                let Some(reply) = reply_from_parts(
                    message.subject.as_str(),
                    message.headers.as_ref(),
                    message.payload,
                ) else {
                    warn!(subject = %message.subject, "reply without correlation key dropped");
                    continue;
                };

                if reply_tx.send(reply).is_err() {
                    break;
                }
            }
        });
    }

    async fn publish(&self, topic: &str, message: &OutboundMessage) -> Result<(), Error> {
        let client = self.client()?;

        client
            .publish_with_headers(
                topic.to_string(),
                outbound_headers(message),
                message.payload.clone(),
            )
            .await
            .map_err(|e| Error::Publish(e.kind()))?;

        client.flush().await.map_err(|e| Error::Flush(e.kind()))
    }
}

#[async_trait]
impl Transport for NatsTransport {
    type Error = Error;

    async fn replies(&self) -> Result<ReplyStream, Self::Error> {
        let receiver = self.reply_rx.lock().take().ok_or(Error::RepliesTaken)?;

        Ok(UnboundedReceiverStream::new(receiver).boxed())
    }

    async fn subscribe_to_response_of(&self, topic: &str) -> Result<(), Self::Error> {
        let subject = topic::reply_topic(topic);
        self.reply_subjects.lock().push(subject.clone());

        let connected = self.client.read().clone();
        if let Some(client) = connected {
            let subscriber = Self::subscribe_reply_subject(&client, subject).await?;
            Self::spawn_forwarder(subscriber, self.reply_tx.clone());
        }

        Ok(())
    }

    async fn connect(&self) -> Result<(), Self::Error> {
        if self.client.read().is_some() {
            return Ok(());
        }

        let client = ConnectOptions::new()
            .name(&self.options.name)
            .connection_timeout(self.options.connection_timeout)
            .connect(self.options.url.as_str())
            .await
            .map_err(Error::Connect)?;

        let subjects = self.reply_subjects.lock().clone();
        let subscribers = subscribe_all(subjects, |subject| {
            Self::subscribe_reply_subject(&client, subject)
        })
        .await?;
        for subscriber in subscribers {
            Self::spawn_forwarder(subscriber, self.reply_tx.clone());
        }

        info!(url = %self.options.url, "connected to NATS");

        *self.client.write() = Some(client);

        Ok(())
    }

    async fn send(&self, topic: &str, message: OutboundMessage) -> Result<(), Self::Error> {
        self.publish(topic, &message).await
    }

    async fn emit(&self, topic: &str, message: OutboundMessage) -> Result<(), Self::Error> {
        self.publish(topic, &message).await
    }
}

// Subscribes every subject or none: on failure the subscriptions already made
// are dropped, which unsubscribes them.
async fn subscribe_all<S, F, Fut>(subjects: Vec<String>, mut subscribe: F) -> Result<Vec<S>, Error>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<S, Error>>,
{
    let mut subscribers = Vec::with_capacity(subjects.len());
    for subject in subjects {
        subscribers.push(subscribe(subject).await?);
    }

    Ok(subscribers)
}

/// Routing headers for `message`.
#[must_use]
pub fn outbound_headers(message: &OutboundMessage) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CORRELATION_KEY_HEADER, message.key.as_str());

    if let Some(reply_topic) = &message.reply_topic {
        headers.insert(REPLY_TOPIC_HEADER, reply_topic.as_str());
    }

    headers
}

/// Rebuilds a reply from a received message. `None` when the correlation key is missing.
#[must_use]
pub fn reply_from_parts(subject: &str, headers: Option<&HeaderMap>, payload: Bytes) -> Option<Reply> {
    let headers = headers?;
    let key = headers.get(CORRELATION_KEY_HEADER)?.as_str().to_string();
    let error = headers
        .get(REPLY_ERROR_HEADER)
        .map(|value| value.as_str().to_string());

    Some(Reply {
        topic: subject.to_string(),
        key,
        payload,
        error,
    })
}
