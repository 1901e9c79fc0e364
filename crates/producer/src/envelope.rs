use crate::Error;
use crate::correlation::CorrelationKey;

use std::collections::HashMap;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Message headers, attached to the envelope verbatim.
pub type Headers = HashMap<String, String>;

/// The wire form of an outbound message.
///
/// Serializes as `{ "key": ..., "value": ..., "headers"?: {...} }`. The key is
/// always generated by [`Envelope::build`]; callers cannot supply their own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    key: CorrelationKey,
    value: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    headers: Option<Headers>,
}

impl<T> Envelope<T> {
    /// Wraps `value` with a fresh correlation key.
    ///
    /// Empty header maps are dropped so the serialized envelope omits the field.
    #[must_use]
    pub fn build(value: T, headers: Option<Headers>) -> Self {
        Self {
            key: CorrelationKey::generate(),
            value,
            headers: headers.filter(|headers| !headers.is_empty()),
        }
    }

    /// The correlation key.
    #[must_use]
    pub const fn key(&self) -> &CorrelationKey {
        &self.key
    }

    /// The payload.
    #[must_use]
    pub const fn value(&self) -> &T {
        &self.value
    }

    /// The headers, if any were supplied.
    #[must_use]
    pub const fn headers(&self) -> Option<&Headers> {
        self.headers.as_ref()
    }

    /// Splits the envelope into key, value and headers.
    #[must_use]
    pub fn into_parts(self) -> (CorrelationKey, T, Option<Headers>) {
        (self.key, self.value, self.headers)
    }
}

impl<T> Envelope<T>
where
    T: Serialize,
{
    /// Encodes the envelope as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] if the value cannot be serialized.
    pub fn encode(&self) -> Result<Bytes, Error> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(Error::Encode)
    }
}

impl<T> Envelope<T>
where
    T: DeserializeOwned,
{
    /// Decodes an envelope previously produced by [`Envelope::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the bytes are not a valid envelope for `T`.
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(bytes).map_err(Error::Decode)
    }
}
