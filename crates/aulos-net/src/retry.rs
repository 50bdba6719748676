use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use tokio::time::sleep;
use tracing::warn;
use url::Url;

use crate::{
    ByteStream, Net, NetError,
    types::{Headers, NetOptions, RangeSpec},
};

/// Exponential backoff with full jitter.
#[derive(Clone, Debug)]
pub struct BackoffPolicy {
    /// Attempts after the first; `None` means retry forever.
    pub max_retry: Option<u32>,
    pub base: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    #[must_use]
    pub fn from_options(options: &NetOptions) -> Self {
        Self {
            max_retry: options.max_retry,
            base: options.backoff_base,
            max: options.backoff_max,
        }
    }

    /// Whether attempt number `attempt` (0-based) may be followed by another.
    #[must_use]
    pub fn allows_retry(&self, attempt: u32) -> bool {
        self.max_retry.is_none_or(|max| attempt < max)
    }

    /// Delay before retry number `attempt` (1-based), jittered over the
    /// upper half of the exponential window.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exp = self
            .base
            .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
            .min(self.max);
        let half = exp / 2;
        half + rand::thread_rng().gen_range(Duration::ZERO..=half)
    }
}

/// Retry decorator for [`Net`] implementations.
///
/// Only retries errors whose [`NetError::is_retryable`] is true; exhausted
/// budgets surface as [`NetError::RetryExhausted`] wrapping the last error.
pub struct RetryNet<N> {
    inner: N,
    policy: BackoffPolicy,
}

impl<N: Net> RetryNet<N> {
    pub fn new(inner: N, policy: BackoffPolicy) -> Self {
        Self { inner, policy }
    }

    async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, NetError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, NetError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !error.is_retryable() {
                        return Err(error);
                    }
                    if !self.policy.allows_retry(attempt) {
                        return Err(NetError::RetryExhausted {
                            attempts: attempt + 1,
                            source: Box::new(error),
                        });
                    }
                    attempt += 1;
                    let delay = self.policy.delay_for_attempt(attempt);
                    warn!(attempt, ?delay, error = %error, "retrying request");
                    sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl<N: Net> Net for RetryNet<N> {
    async fn get_bytes(&self, url: Url, headers: Option<Headers>) -> Result<Bytes, NetError> {
        self.run(|| self.inner.get_bytes(url.clone(), headers.clone()))
            .await
    }

    async fn stream(&self, url: Url, headers: Option<Headers>) -> Result<ByteStream, NetError> {
        self.run(|| self.inner.stream(url.clone(), headers.clone()))
            .await
    }

    async fn get_range(
        &self,
        url: Url,
        range: RangeSpec,
        headers: Option<Headers>,
    ) -> Result<Bytes, NetError> {
        self.run(|| {
            self.inner
                .get_range(url.clone(), range.clone(), headers.clone())
        })
        .await
    }

    async fn head(&self, url: Url, headers: Option<Headers>) -> Result<Headers, NetError> {
        self.run(|| self.inner.head(url.clone(), headers.clone()))
            .await
    }
}
