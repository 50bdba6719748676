use std::time::Duration;

use async_trait::async_trait;
use aulos_media::{RepresentationId, SegmentInfo};
use aulos_net::cmcd::{CmcdOptions, CmcdPayload};
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::FetchResult;

/// Container format of a segment, as far as the manifest tells us.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ContainerKind {
    Mp4,
    WebM,
    MpegTs,
    #[default]
    Unknown,
}

impl ContainerKind {
    /// Guess from a mime string like `video/mp4; codecs="avc1..."`.
    #[must_use]
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.to_ascii_lowercase();
        if mime.contains("mp4") {
            Self::Mp4
        } else if mime.contains("webm") {
            Self::WebM
        } else if mime.contains("mp2t") {
            Self::MpegTs
        } else {
            Self::Unknown
        }
    }

    /// Whether the low-latency chunked loader understands this container.
    #[must_use]
    pub fn supports_chunked(self) -> bool {
        matches!(self, Self::Mp4 | Self::Unknown)
    }
}

/// Everything the fetcher needs to know about one segment request.
#[derive(Clone, Debug)]
pub struct FetchContext {
    pub representation: RepresentationId,
    pub segment: SegmentInfo,
    pub container: ContainerKind,
    /// Duration of media this request buffers, used for ABR scoring.
    pub segment_duration: f64,
    /// CMCD values for this request, when decoration is enabled.
    pub cmcd: Option<CmcdPayload>,
}

/// Fetcher configuration.
#[derive(Clone, Debug, Default)]
pub struct FetchOptions {
    /// Stream-and-chunk MP4 segments instead of buffering whole responses.
    pub low_latency: bool,
    /// Validate container-level completeness of finished segments.
    pub check_integrity: bool,
    /// CMCD decoration; absent disables it.
    pub cmcd: Option<CmcdOptions>,
}

/// Events of one segment request, in emission order.
#[derive(Clone, Debug)]
pub enum RequestEvent {
    /// The first network attempt is about to start.
    Begin { request_id: u64 },
    /// Transfer progress of the current attempt.
    Progress {
        loaded: u64,
        total: Option<u64>,
        elapsed: Duration,
    },
    /// A recoverable failure occurred; the request is retrying.
    Retry { error: crate::FetchError },
    /// A complete parseable unit of media data.
    Chunk { bytes: Bytes },
    /// All chunks of the segment were emitted.
    ChunkComplete,
    /// Terminal success marker, after metrics have been reported.
    Ended,
}

/// One completed transfer, reported to the ABR layer.
#[derive(Clone, Debug)]
pub struct MetricsSample {
    pub representation: RepresentationId,
    pub segment_id: u64,
    pub size: u64,
    pub duration: Duration,
    pub segment_duration: f64,
}

/// Outcome of a custom segment loader attempt.
#[derive(Clone, Debug)]
pub enum CustomLoaderOutcome {
    /// The loader produced the segment itself.
    Resolved {
        data: Bytes,
        duration: Option<Duration>,
    },
    /// The loader declined; fall back to the regular transport.
    Fallback,
}

/// Application-provided segment loader.
///
/// Consulted for buffered (non-low-latency) loads only; must observe
/// `cancel` and stop promptly when it fires.
#[async_trait]
pub trait CustomSegmentLoader: Send + Sync {
    async fn load(
        &self,
        url: &Url,
        context: &FetchContext,
        cancel: &CancellationToken,
    ) -> FetchResult<CustomLoaderOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_from_mime() {
        assert_eq!(ContainerKind::from_mime("video/mp4"), ContainerKind::Mp4);
        assert_eq!(
            ContainerKind::from_mime("audio/webm; codecs=opus"),
            ContainerKind::WebM
        );
        assert_eq!(ContainerKind::from_mime("video/mp2t"), ContainerKind::MpegTs);
        assert_eq!(ContainerKind::from_mime("text/vtt"), ContainerKind::Unknown);
    }

    #[test]
    fn chunked_support() {
        assert!(ContainerKind::Mp4.supports_chunked());
        assert!(ContainerKind::Unknown.supports_chunked());
        assert!(!ContainerKind::WebM.supports_chunked());
        assert!(!ContainerKind::MpegTs.supports_chunked());
    }
}
