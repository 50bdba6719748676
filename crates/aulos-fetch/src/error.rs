use aulos_net::NetError;
use thiserror::Error;

pub type FetchResult<T> = Result<T, FetchError>;

/// Broad classification carried by every fetch error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FetchErrorKind {
    Timeout,
    /// Non-retryable HTTP status.
    Status,
    /// Transient network failure.
    Network,
    /// The delivered bytes fail container-level validation.
    Integrity,
    /// A concurrent request for the same segment already exists.
    Duplicate,
    Cancelled,
}

/// Segment fetch errors.
#[derive(Clone, Debug, Error)]
pub enum FetchError {
    #[error("network: {0}")]
    Net(#[from] NetError),

    #[error("segment integrity: {0}")]
    Integrity(String),

    #[error("request already in flight for this segment")]
    DuplicateRequest,

    #[error("segment has no URL")]
    NoUrl,

    #[error("custom loader: {0}")]
    CustomLoader(String),

    #[error("cancelled")]
    Cancelled,
}

impl FetchError {
    #[must_use]
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Net(NetError::Timeout) => FetchErrorKind::Timeout,
            Self::Net(e) if e.is_retryable() => FetchErrorKind::Network,
            Self::Net(_) => FetchErrorKind::Status,
            Self::Integrity(_) => FetchErrorKind::Integrity,
            Self::DuplicateRequest => FetchErrorKind::Duplicate,
            Self::NoUrl => FetchErrorKind::Status,
            Self::CustomLoader(_) => FetchErrorKind::Network,
            Self::Cancelled => FetchErrorKind::Cancelled,
        }
    }

    /// Whether retrying this request can reasonably succeed.
    ///
    /// Integrity failures count as transient: a truncated delivery usually
    /// means a broken edge cache, not broken content.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Net(e) => e.is_retryable(),
            Self::Integrity(_) => true,
            Self::CustomLoader(_) => true,
            Self::DuplicateRequest | Self::NoUrl | Self::Cancelled => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;

    #[test]
    fn integrity_errors_are_retryable() {
        let err = FetchError::Integrity("truncated mdat".into());
        assert!(err.is_retryable());
        assert_eq!(err.kind(), FetchErrorKind::Integrity);
    }

    #[test]
    fn status_kind_tracks_retryability() {
        let url = Url::parse("https://cdn.example/x").unwrap();
        let transient = FetchError::Net(NetError::Status {
            status: 503,
            url: url.clone(),
        });
        assert_eq!(transient.kind(), FetchErrorKind::Network);
        assert!(transient.is_retryable());

        let terminal = FetchError::Net(NetError::Status { status: 404, url });
        assert_eq!(terminal.kind(), FetchErrorKind::Status);
        assert!(!terminal.is_retryable());
    }

    #[test]
    fn cancellation_is_terminal() {
        assert!(!FetchError::Cancelled.is_retryable());
    }
}
