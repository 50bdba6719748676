use async_trait::async_trait;
use aulos_ranges::TimeRanges;
use bytes::Bytes;
use thiserror::Error;

pub type SinkResult<T> = Result<T, SinkError>;

/// Sink failures.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SinkError {
    /// The sink is out of memory; recoverable after evicting history.
    #[error("sink quota exceeded")]
    QuotaExceeded,

    /// The sink cannot accept this codec/format at all.
    #[error("codec rejected: {0}")]
    CodecRejected(String),

    /// The underlying media source is gone.
    #[error("media source closed")]
    Closed,

    #[error("sink failure: {0}")]
    Other(String),
}

impl SinkError {
    /// Fatal errors end this sink; only quota pressure is recoverable.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::QuotaExceeded)
    }
}

/// Parameters of one append operation.
#[derive(Clone, Debug)]
pub struct AppendParams {
    /// Codec of the appended data, e.g. `avc1.4d401e`.
    pub codec: String,
    /// Offset added to media timestamps inside the data.
    pub timestamp_offset: f64,
    /// `[start, end]` window outside of which appended frames are dropped.
    pub append_window: (Option<f64>, Option<f64>),
    /// Presentation interval the data covers, when the parser knows it.
    /// Sinks that parse timestamps themselves may ignore it.
    pub time_range: Option<(f64, f64)>,
}

/// Abstract media sink.
///
/// Implementations must complete operations in call order (the queue above
/// them guarantees callers do not interleave).
#[async_trait]
pub trait SegmentSink: Send + Sync {
    /// Append encoded media.
    async fn append(&self, data: Bytes, params: AppendParams) -> SinkResult<()>;

    /// Drop buffered media in `[start, end)`.
    async fn remove(&self, start: f64, end: f64) -> SinkResult<()>;

    /// Signal that no further appends will come.
    async fn end_of_stream(&self) -> SinkResult<()>;

    /// Time ranges currently buffered.
    fn buffered(&self) -> TimeRanges;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_quota_is_recoverable() {
        assert!(!SinkError::QuotaExceeded.is_fatal());
        assert!(SinkError::CodecRejected("hvc1".into()).is_fatal());
        assert!(SinkError::Closed.is_fatal());
        assert!(SinkError::Other("detached".into()).is_fatal());
    }
}
