//! Rebuffering and freezing derivation, kept separate from the sampling
//! task so playback trajectories can be driven synchronously in tests.

use std::time::Duration;

use crate::{ClockOptions, Freezing, MediaEvent, RebufferReason, Rebuffering};

/// One media-state sample, already reduced to the fields the state machine
/// needs.
#[derive(Clone, Debug)]
pub(crate) struct Snapshot {
    pub position: f64,
    pub buffer_gap: f64,
    pub ready_state: u8,
    pub paused: bool,
    pub seeking: bool,
    pub ended: bool,
    pub playback_rate: f64,
    /// Whether the buffer reaches the known end of the media.
    pub fully_loaded: bool,
    pub event: Option<MediaEvent>,
}

/// Derives rebuffering/freezing from successive snapshots.
#[derive(Debug, Default)]
pub(crate) struct StatusTracker {
    rebuffering: Option<Rebuffering>,
    freezing: Option<Freezing>,
    /// Initial load is over once playback has demonstrably begun.
    started: bool,
    prev_position: Option<f64>,
    /// Consecutive samples with an unmoving position (no-media-source path).
    stalled_samples: u32,
}

impl StatusTracker {
    pub(crate) fn update(
        &mut self,
        options: &ClockOptions,
        snap: &Snapshot,
        now: Duration,
    ) -> (Option<Rebuffering>, Option<Freezing>) {
        self.started = self.started
            || snap.position > 0.0
            || snap.ready_state >= 3
            || snap.event == Some(MediaEvent::Play);

        if options.has_media_source {
            self.update_with_media_source(options, snap, now);
        } else {
            self.update_without_media_source(snap, now);
        }

        self.update_freezing(options, snap, now);
        self.prev_position = Some(snap.position);
        (self.rebuffering, self.freezing)
    }

    fn update_with_media_source(&mut self, options: &ClockOptions, snap: &Snapshot, now: Duration) {
        match self.rebuffering {
            None => {
                let gap_low =
                    snap.buffer_gap <= options.rebuffer_gap() || snap.buffer_gap == f64::INFINITY;
                if self.started
                    && snap.ready_state >= 1
                    && !snap.ended
                    && !snap.fully_loaded
                    && gap_low
                {
                    let reason = if snap.seeking {
                        RebufferReason::Seeking
                    } else if snap.ready_state == 1 {
                        RebufferReason::NotReady
                    } else {
                        RebufferReason::Buffering
                    };
                    tracing::debug!(
                        position = snap.position,
                        buffer_gap = snap.buffer_gap,
                        ?reason,
                        "rebuffering started"
                    );
                    self.rebuffering = Some(Rebuffering {
                        reason,
                        since: now,
                        target: snap.seeking.then_some(snap.position),
                    });
                }
            }
            Some(rebuffering) => {
                let gap_recovered = snap.buffer_gap.is_finite()
                    && snap.buffer_gap > options.resume_gap(rebuffering.reason);
                if snap.ready_state > 1 && (snap.fully_loaded || snap.ended || gap_recovered) {
                    tracing::debug!(
                        position = snap.position,
                        buffer_gap = snap.buffer_gap,
                        "rebuffering ended"
                    );
                    self.rebuffering = None;
                }
            }
        }
    }

    /// Directfile playback exposes no buffered ranges worth trusting: the
    /// position is the only reliable progress signal.
    fn update_without_media_source(&mut self, snap: &Snapshot, now: Duration) {
        let unmoving = self.prev_position == Some(snap.position);
        if snap.event == Some(MediaEvent::TimeUpdate) && unmoving && !snap.paused {
            self.stalled_samples += 1;
        } else if !unmoving || snap.paused {
            self.stalled_samples = 0;
        }

        match self.rebuffering {
            None => {
                if self.stalled_samples >= 2 {
                    self.rebuffering = Some(Rebuffering {
                        reason: RebufferReason::Buffering,
                        since: now,
                        target: None,
                    });
                } else if snap.seeking && snap.buffer_gap == f64::INFINITY {
                    self.rebuffering = Some(Rebuffering {
                        reason: RebufferReason::Seeking,
                        since: now,
                        target: Some(snap.position),
                    });
                }
            }
            Some(_) => {
                if !unmoving && !snap.seeking {
                    self.rebuffering = None;
                    self.stalled_samples = 0;
                }
            }
        }
    }

    fn update_freezing(&mut self, options: &ClockOptions, snap: &Snapshot, now: Duration) {
        if self.rebuffering.is_some() {
            self.freezing = None;
            return;
        }

        let unmoving = self.prev_position == Some(snap.position);
        let should_advance = snap.ready_state >= 1
            && !snap.paused
            && !snap.ended
            && snap.playback_rate != 0.0
            && snap.buffer_gap > options.freezing_gap;

        if should_advance && unmoving {
            if self.freezing.is_none() {
                tracing::debug!(position = snap.position, "freezing detected");
                self.freezing = Some(Freezing { since: now });
            }
        } else {
            self.freezing = None;
        }
    }
}
