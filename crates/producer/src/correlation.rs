use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of random characters after the timestamp.
pub const SUFFIX_LEN: usize = 10;

// Greatest timestamp handed out so far. Keeps prefixes non-decreasing if the wall clock steps back.
static LAST_TIMESTAMP: AtomicU64 = AtomicU64::new(0);

/// Error returned when a string is not a well-formed correlation key.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid correlation key: {0}")]
pub struct ParseCorrelationKeyError(String);

/// A per-message identifier of the form `<millis>-<suffix>`.
///
/// Keys sort by creation time (to the millisecond) and are unique within a
/// process with overwhelming probability.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CorrelationKey(String);

impl CorrelationKey {
    /// Generates a fresh key.
    ///
    /// Safe to call from any task or thread: the suffix comes from a
    /// thread-local RNG and the timestamp clamp is a single atomic.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = next_timestamp();
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(char::from)
            .collect();

        Self(format!("{timestamp}-{suffix}"))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Milliseconds since the epoch encoded in the key.
    #[must_use]
    pub fn timestamp_millis(&self) -> u64 {
        self.0
            .split_once('-')
            .and_then(|(timestamp, _)| timestamp.parse().ok())
            .unwrap_or_default()
    }

    /// The random suffix.
    #[must_use]
    pub fn suffix(&self) -> &str {
        self.0.split_once('-').map_or("", |(_, suffix)| suffix)
    }
}

fn wall_clock_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
        })
}

fn next_timestamp() -> u64 {
    let now = wall_clock_millis();
    let previous = LAST_TIMESTAMP.fetch_max(now, Ordering::AcqRel);
    previous.max(now)
}

impl FromStr for CorrelationKey {
    type Err = ParseCorrelationKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((timestamp, suffix)) = s.split_once('-') else {
            return Err(ParseCorrelationKeyError(s.to_string()));
        };

        let timestamp_ok = !timestamp.is_empty()
            && timestamp.bytes().all(|b| b.is_ascii_digit())
            && timestamp.parse::<u64>().is_ok();
        let suffix_ok =
            suffix.len() == SUFFIX_LEN && suffix.bytes().all(|b| b.is_ascii_alphanumeric());

        if timestamp_ok && suffix_ok {
            Ok(Self(s.to_string()))
        } else {
            Err(ParseCorrelationKeyError(s.to_string()))
        }
    }
}

impl TryFrom<String> for CorrelationKey {
    type Error = ParseCorrelationKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CorrelationKey> for String {
    fn from(key: CorrelationKey) -> Self {
        key.0
    }
}

impl AsRef<str> for CorrelationKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
