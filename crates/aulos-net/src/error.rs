use thiserror::Error;
use url::Url;

pub type NetResult<T> = Result<T, NetError>;

/// Transport errors.
#[derive(Clone, Debug, Error)]
pub enum NetError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: Url },

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("request failed after {attempts} attempts: {source}")]
    RetryExhausted { attempts: u32, source: Box<Self> },

    #[error("cancelled")]
    Cancelled,
}

impl NetError {
    /// Whether a retry can reasonably succeed.
    ///
    /// Server-side failures (5xx) and throttling/timeout statuses (408, 429)
    /// are transient; other 4xx statuses mean the request itself is wrong
    /// and fails fast.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Connect(_) | Self::Transfer(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Self::RetryExhausted { .. } | Self::Cancelled => false,
        }
    }

    /// Whether trying a different CDN first is worthwhile.
    ///
    /// Same set as [`is_retryable`](Self::is_retryable) minus timeouts on
    /// the local side: a 404 from one CDN stays a 404 on every mirror.
    #[must_use]
    pub fn is_worth_cdn_switch(&self) -> bool {
        self.is_retryable()
    }
}

impl From<reqwest::Error> for NetError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::Timeout;
        }
        if e.is_connect() {
            // Alternate formatting keeps the full cause chain.
            return Self::Connect(format!("{e:#}"));
        }
        Self::Transfer(format!("{e:#}"))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn url() -> Url {
        Url::parse("https://cdn.example/seg.m4s").unwrap()
    }

    #[rstest]
    #[case::timeout(NetError::Timeout, true)]
    #[case::connect(NetError::Connect("refused".into()), true)]
    #[case::http_500(NetError::Status { status: 500, url: url() }, true)]
    #[case::http_503(NetError::Status { status: 503, url: url() }, true)]
    #[case::http_408(NetError::Status { status: 408, url: url() }, true)]
    #[case::http_429(NetError::Status { status: 429, url: url() }, true)]
    #[case::http_404(NetError::Status { status: 404, url: url() }, false)]
    #[case::http_403(NetError::Status { status: 403, url: url() }, false)]
    #[case::cancelled(NetError::Cancelled, false)]
    #[case::exhausted(
        NetError::RetryExhausted { attempts: 3, source: Box::new(NetError::Timeout) },
        false
    )]
    fn retryability(#[case] error: NetError, #[case] expected: bool) {
        assert_eq!(error.is_retryable(), expected);
    }
}
