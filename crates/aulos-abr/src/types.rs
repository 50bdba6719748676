use std::time::Duration;

use aulos_media::RepresentationId;
use web_time::Instant;

/// Where a throughput sample came from.
///
/// Cache-served bytes say nothing about the network and must never enter
/// the bandwidth estimator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ThroughputSampleSource {
    Network,
    Cache,
}

/// One completed transfer, reported by the segment fetcher.
#[derive(Clone, Copy, Debug)]
pub struct ThroughputSample {
    pub bytes: u64,
    pub duration: Duration,
    pub at: Instant,
    pub source: ThroughputSampleSource,
}

/// Progress of an in-flight segment request.
#[derive(Clone, Copy, Debug)]
pub struct RequestProgress {
    pub loaded: u64,
    pub total: Option<u64>,
    pub elapsed: Duration,
    /// Duration of media the request will buffer once complete.
    pub segment_duration: f64,
}

/// Bitrate ladder entry the estimator selects among.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RepresentationInfo {
    pub id: RepresentationId,
    /// Bits per second.
    pub bitrate: u64,
}

/// Playback-side inputs to the decision, reduced from clock observations.
#[derive(Clone, Copy, Debug)]
pub struct PlaybackSignal {
    pub position: f64,
    /// Buffered seconds ahead of the position; `+∞` outside the buffer.
    pub buffer_gap: f64,
    /// Playback rate the user asked for (never the rebuffer-forced zero).
    pub speed: f64,
}

impl Default for PlaybackSignal {
    fn default() -> Self {
        Self {
            position: 0.0,
            buffer_gap: f64::INFINITY,
            speed: 1.0,
        }
    }
}

/// The estimator's current choice.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AbrDecision {
    pub representation: RepresentationId,
    /// Bitrate of the chosen representation.
    pub bitrate: u64,
    /// Raw bandwidth estimate the choice was derived from, when one exists.
    pub bitrate_estimate: Option<u64>,
    /// Whether the switch should interrupt in-flight work.
    pub urgent: bool,
    /// Whether a manual override produced this decision.
    pub manual: bool,
    /// Bitrate of the highest representation currently proven sustainable,
    /// scaled down by playback speed.
    pub stable_bitrate_hint: Option<u64>,
}

/// ABR configuration.
#[derive(Clone, Debug)]
pub struct AbrOptions {
    /// Lower bound for automatic selection, bits per second.
    pub min_auto_bitrate: u64,
    /// Upper bound for automatic selection, bits per second.
    pub max_auto_bitrate: u64,
    /// Manual bitrate override; negative means automatic.
    pub manual_bitrate: i64,
    /// Seed for the bandwidth estimator before any sample arrives.
    pub initial_bitrate: Option<u64>,
    /// Buffer gap at or below which bandwidth-only mode engages.
    pub low_buffer_gap: f64,
    /// Buffer gap above which bandwidth-only mode disengages.
    pub high_buffer_gap: f64,
    /// Samples shorter than this never enter the bandwidth estimator.
    pub min_sample_duration: Duration,
    /// Samples smaller than this never enter the bandwidth estimator.
    pub min_sample_bytes: u64,
    /// Score above which a representation counts as stable.
    pub stable_score_threshold: f64,
    /// Samples required before a score is trusted.
    pub score_confidence_samples: u32,
    /// In-flight requests younger than this are ignored when capping the
    /// bandwidth estimate.
    pub min_inflight_elapsed: Duration,
}

impl Default for AbrOptions {
    fn default() -> Self {
        Self {
            min_auto_bitrate: 0,
            max_auto_bitrate: u64::MAX,
            manual_bitrate: -1,
            initial_bitrate: None,
            low_buffer_gap: 5.0,
            high_buffer_gap: 10.0,
            min_sample_duration: Duration::from_millis(150),
            min_sample_bytes: 16_000,
            stable_score_threshold: 1.2,
            score_confidence_samples: 5,
            min_inflight_elapsed: Duration::from_secs(1),
        }
    }
}
