use std::time::Duration;

use crate::RebufferReason;

/// Playback observer configuration.
///
/// Gap constants follow the profiles the engine ships with; all of them are
/// overridable because deployments tune them per content type.
#[derive(Clone, Debug)]
pub struct ClockOptions {
    /// Tighter gaps and faster sampling for low-latency streams.
    pub low_latency: bool,
    /// Whether playback goes through a media source (affects sampling rate
    /// and which rebuffer detection applies).
    pub has_media_source: bool,
    /// Sampling interval in low-latency mode.
    pub interval_low_latency: Duration,
    /// Sampling interval with a media source attached.
    pub interval_media_source: Duration,
    /// Sampling interval without a media source (direct file playback).
    pub interval_no_media_source: Duration,
    /// Buffer gap at or below which rebuffering starts.
    pub rebuffer_gap: f64,
    /// Low-latency variant of `rebuffer_gap`.
    pub rebuffer_gap_low_latency: f64,
    /// Buffer gap required to resume after a seek-triggered rebuffer.
    pub resume_gap_seeking: f64,
    pub resume_gap_seeking_low_latency: f64,
    /// Buffer gap required to resume after a not-ready rebuffer.
    pub resume_gap_not_ready: f64,
    pub resume_gap_not_ready_low_latency: f64,
    /// Buffer gap required to resume after a plain buffer underrun.
    pub resume_gap_buffering: f64,
    pub resume_gap_buffering_low_latency: f64,
    /// Minimum buffer ahead for an unmoving position to count as freezing
    /// rather than rebuffering.
    pub freezing_gap: f64,
    /// How long an engine-initiated seek may go unacknowledged by a
    /// `seeking` event before the pending flag is reconciled away.
    pub internal_seek_timeout: Duration,
}

impl Default for ClockOptions {
    fn default() -> Self {
        Self {
            low_latency: false,
            has_media_source: true,
            interval_low_latency: Duration::from_millis(100),
            interval_media_source: Duration::from_millis(1000),
            interval_no_media_source: Duration::from_millis(500),
            rebuffer_gap: 1.0,
            rebuffer_gap_low_latency: 0.5,
            resume_gap_seeking: 1.5,
            resume_gap_seeking_low_latency: 0.5,
            resume_gap_not_ready: 0.5,
            resume_gap_not_ready_low_latency: 0.3,
            resume_gap_buffering: 5.0,
            resume_gap_buffering_low_latency: 0.5,
            freezing_gap: 10.0,
            internal_seek_timeout: Duration::from_secs(2),
        }
    }
}

impl ClockOptions {
    /// Effective sampling interval for the configured mode.
    #[must_use]
    pub fn sampling_interval(&self) -> Duration {
        if self.low_latency {
            self.interval_low_latency
        } else if self.has_media_source {
            self.interval_media_source
        } else {
            self.interval_no_media_source
        }
    }

    /// Gap at or below which rebuffering starts.
    #[must_use]
    pub fn rebuffer_gap(&self) -> f64 {
        if self.low_latency {
            self.rebuffer_gap_low_latency
        } else {
            self.rebuffer_gap
        }
    }

    /// Gap above which a rebuffer with the given reason may end.
    #[must_use]
    pub fn resume_gap(&self, reason: RebufferReason) -> f64 {
        match (reason, self.low_latency) {
            (RebufferReason::Seeking, false) => self.resume_gap_seeking,
            (RebufferReason::Seeking, true) => self.resume_gap_seeking_low_latency,
            (RebufferReason::NotReady, false) => self.resume_gap_not_ready,
            (RebufferReason::NotReady, true) => self.resume_gap_not_ready_low_latency,
            (RebufferReason::Buffering, false) => self.resume_gap_buffering,
            (RebufferReason::Buffering, true) => self.resume_gap_buffering_low_latency,
        }
    }
}
