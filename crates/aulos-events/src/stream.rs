use aulos_media::{AdaptationId, PeriodId, RepresentationId, TrackKind};
use aulos_ranges::TimeRanges;

/// Stream orchestration events.
#[derive(Clone, Debug)]
pub enum StreamEvent {
    /// A period stream finished its setup for one track kind.
    PeriodStreamReady { period: PeriodId, kind: TrackKind },
    /// The active track (adaptation) changed.
    AdaptationChange {
        period: PeriodId,
        kind: TrackKind,
        adaptation: Option<AdaptationId>,
    },
    /// The active representation changed.
    RepresentationChange {
        period: PeriodId,
        adaptation: AdaptationId,
        representation: RepresentationId,
    },
    /// A segment was appended to the sink.
    AddedSegment {
        representation: RepresentationId,
        segment_id: u64,
        buffered: TimeRanges,
    },
    /// The whole period is buffered for this track kind.
    StreamComplete { kind: TrackKind },
    /// The manifest is stale and needs refetching.
    NeedsManifestRefresh,
    /// The current sink cannot accommodate the switch; the media source
    /// must be torn down and re-attached.
    NeedsMediaSourceReload {
        /// Position to restore after the reload.
        position: f64,
        /// Whether playback should resume automatically afterwards.
        auto_play: bool,
    },
    /// Buffered data must be dropped (e.g. after a seek over a discontinuity).
    NeedsBufferFlush,
    /// Ranges buffered from now-undecipherable representations must go.
    NeedsDecipherabilityFlush { ranges: TimeRanges },
    /// Protection metadata surfaced from segment parsing.
    EncryptionDataEncountered { data: Vec<u8> },
    /// Recoverable stream-level problem.
    Warning { message: String },
}
