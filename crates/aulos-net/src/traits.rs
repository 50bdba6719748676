use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use url::Url;

use crate::{
    NetError,
    types::{Headers, NetOptions, RangeSpec},
};

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, NetError>> + Send>>;

/// Abstract HTTP transport.
///
/// Implementations are stateless with respect to requests; cancellation is
/// the caller's concern (dropping the returned future aborts the transfer).
#[async_trait]
pub trait Net: Send + Sync {
    /// Fetch a whole resource into memory.
    async fn get_bytes(&self, url: Url, headers: Option<Headers>) -> Result<Bytes, NetError>;

    /// Stream a resource chunk by chunk as the network delivers it.
    async fn stream(&self, url: Url, headers: Option<Headers>) -> Result<ByteStream, NetError>;

    /// Fetch a byte range of a resource into memory.
    async fn get_range(
        &self,
        url: Url,
        range: RangeSpec,
        headers: Option<Headers>,
    ) -> Result<Bytes, NetError>;

    /// Response headers of a `HEAD` request.
    async fn head(&self, url: Url, headers: Option<Headers>) -> Result<Headers, NetError>;
}

/// Decorator constructors for any [`Net`].
pub trait NetExt: Net + Sized {
    /// Bound every request with a timeout.
    fn with_timeout(self, timeout: std::time::Duration) -> crate::timeout::TimeoutNet<Self>;

    /// Retry transient failures with exponential backoff.
    fn with_retry(self, options: &NetOptions) -> crate::retry::RetryNet<Self>;
}

impl<T: Net> NetExt for T {
    fn with_timeout(self, timeout: std::time::Duration) -> crate::timeout::TimeoutNet<Self> {
        crate::timeout::TimeoutNet::new(self, timeout)
    }

    fn with_retry(self, options: &NetOptions) -> crate::retry::RetryNet<Self> {
        crate::retry::RetryNet::new(self, crate::retry::BackoffPolicy::from_options(options))
    }
}
