use crate::Error;
use crate::producer::Producer;
use crate::state::ProducerState;
use crate::topic;
use crate::transport::Transport;

use std::collections::BTreeSet;

use tracing::{error, info};

/// The startup sequence of a producer.
///
/// Topics are normalized and deduplicated on construction. [`Bootstrap::run`]
/// then subscribes replies for every distinct topic, and only after all of
/// them succeeded connects the transport. Replies for a topic that was not yet
/// subscribed when the connection opened would be lost.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bootstrap {
    topics: BTreeSet<String>,
}

impl Bootstrap {
    /// Collects the topics replies are expected on.
    pub fn new<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            topics: topics
                .into_iter()
                .map(|topic| topic::normalize(topic.as_ref()))
                .collect(),
        }
    }

    /// The distinct, normalized topics.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(String::as_str)
    }

    /// Runs the sequence against `producer`.
    ///
    /// On failure the reply dispatcher is stopped and the producer moves to
    /// [`ProducerState::Failed`], rejecting every later `send` and `emit`.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyBootstrapped`] if the producer was bootstrapped before.
    /// - [`Error::Subscribe`] if a reply subscription was rejected.
    /// - [`Error::Connect`] if the transport failed to connect.
    pub async fn run<Tr>(self, producer: &Producer<Tr>) -> Result<(), Error>
    where
        Tr: Transport,
    {
        producer.begin_bootstrap()?;

        if let Err(e) = self.subscribe_and_connect(producer).await {
            producer.stop_reply_dispatcher();
            producer.set_state(ProducerState::Failed);
            error!(error = %e, "producer bootstrap failed");
            return Err(e);
        }

        producer.set_state(ProducerState::Ready);
        info!(topics = ?self.topics, "producer connected");

        Ok(())
    }

    async fn subscribe_and_connect<Tr>(&self, producer: &Producer<Tr>) -> Result<(), Error>
    where
        Tr: Transport,
    {
        producer.start_reply_dispatcher().await?;

        for topic in &self.topics {
            producer.subscribe_replies(topic).await?;
        }

        producer.set_state(ProducerState::Connecting);

        producer
            .transport()
            .connect()
            .await
            .map_err(|e| Error::Connect(Box::new(e)))
    }
}
