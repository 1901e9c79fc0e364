/// Suffix appended to a normalized topic to name its reply channel.
pub const REPLY_SUFFIX: &str = ".reply";

/// Normalizes a topic name for reply subscriptions.
///
/// Callers pass topics to `send`/`emit` verbatim; normalization only applies
/// where reply channels are named and looked up.
#[must_use]
pub fn normalize(topic: &str) -> String {
    topic.to_lowercase()
}

/// The channel replies to requests on `topic` arrive on.
#[must_use]
pub fn reply_topic(topic: &str) -> String {
    format!("{}{REPLY_SUFFIX}", normalize(topic))
}
