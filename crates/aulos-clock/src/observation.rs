use std::time::Duration;

use aulos_ranges::TimeRanges;

use crate::MediaEvent;

/// Why playback is rebuffering.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RebufferReason {
    /// A seek left the position outside buffered data.
    Seeking,
    /// The element reports it has no usable data (`readyState == 1`).
    NotReady,
    /// The buffer simply ran dry.
    Buffering,
}

/// Playback halted, waiting for buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rebuffering {
    pub reason: RebufferReason,
    /// Monotonic timestamp at which rebuffering started.
    pub since: Duration,
    /// Position rebuffering is trying to reach, when known.
    pub target: Option<f64>,
}

/// Playback appears stalled despite sufficient buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Freezing {
    /// Monotonic timestamp at which the freeze was first seen.
    pub since: Duration,
}

/// One sample of media state, emitted by the playback observer.
#[derive(Clone, Debug)]
pub struct Observation {
    pub position: f64,
    /// Buffered time ahead of `position`; `+∞` when the position is outside
    /// every buffered range.
    pub buffer_gap: f64,
    pub buffered: TimeRanges,
    pub duration: Option<f64>,
    pub playback_rate: f64,
    pub ready_state: u8,
    pub paused: bool,
    pub seeking: bool,
    pub ended: bool,
    /// The media event that triggered this observation, `None` for interval
    /// samples.
    pub event: Option<MediaEvent>,
    pub rebuffering: Option<Rebuffering>,
    pub freezing: Option<Freezing>,
    /// Whether the pending `seeking` state was initiated by the engine
    /// rather than the user.
    pub internal_seek: bool,
    /// Monotonic timestamp from a steady clock.
    pub timestamp: Duration,
}

impl Observation {
    /// Placeholder first value before the observer has sampled anything.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            position: 0.0,
            buffer_gap: f64::INFINITY,
            buffered: TimeRanges::new(),
            duration: None,
            playback_rate: 1.0,
            ready_state: 0,
            paused: true,
            seeking: false,
            ended: false,
            event: None,
            rebuffering: None,
            freezing: None,
            internal_seek: false,
            timestamp: Duration::ZERO,
        }
    }
}
