use crate::Error;

use std::future::Future;
use std::time::Duration;

/// Default bound applied when no timeout is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A single upper bound applied to every send and emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeoutPolicy {
    duration: Duration,
}

impl TimeoutPolicy {
    /// Creates a policy bounding waits by `duration`.
    #[must_use]
    pub const fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// The configured bound.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Runs `future` to completion or fails with [`Error::Timeout`].
    ///
    /// The timer lives inside the returned future and is dropped with it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if `future` does not complete in time.
    pub async fn bound<F>(&self, future: F) -> Result<F::Output, Error>
    where
        F: Future,
    {
        tokio::time::timeout(self.duration, future)
            .await
            .map_err(|_| Error::Timeout(self.duration))
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}
