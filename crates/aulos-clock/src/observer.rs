use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::trace;
use web_time::Instant;

use aulos_ranges::CONTIGUOUS_EPSILON;

use crate::{
    ClockOptions, MediaElement, MediaEvent, Observation,
    status::{Snapshot, StatusTracker},
};

struct ObserverInner {
    tracker: StatusTracker,
    /// Seeks initiated by the engine whose `seeking` event has not been
    /// observed yet.
    pending_internal_seeks: u32,
    last_internal_seek_at: Option<Instant>,
}

/// Samples the media element and broadcasts [`Observation`]s.
///
/// Construction performs no I/O and spawns nothing; [`run`](Self::run)
/// drives the sampling loop until cancelled. Subscribers always see the
/// latest observation immediately (watch semantics), then every subsequent
/// one in order.
pub struct PlaybackObserver {
    media: Arc<dyn MediaElement>,
    options: ClockOptions,
    obs_tx: watch::Sender<Observation>,
    inner: Mutex<ObserverInner>,
    epoch: Instant,
}

impl PlaybackObserver {
    #[must_use]
    pub fn new(media: Arc<dyn MediaElement>, options: ClockOptions) -> Self {
        let (obs_tx, _) = watch::channel(Observation::initial());
        Self {
            media,
            options,
            obs_tx,
            inner: Mutex::new(ObserverInner {
                tracker: StatusTracker::default(),
                pending_internal_seeks: 0,
                last_internal_seek_at: None,
            }),
            epoch: Instant::now(),
        }
    }

    /// Subscribe to observations. The current value is readable right away.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Observation> {
        self.obs_tx.subscribe()
    }

    /// Latest emitted observation.
    #[must_use]
    pub fn latest(&self) -> Observation {
        self.obs_tx.borrow().clone()
    }

    /// Seek initiated by the engine itself (as opposed to the user).
    ///
    /// The next `seeking` event is tagged `internal_seek` so downstream
    /// consumers do not treat it as user intent.
    pub fn set_current_time(&self, position: f64) {
        {
            let mut inner = self.inner.lock();
            inner.pending_internal_seeks += 1;
            inner.last_internal_seek_at = Some(Instant::now());
        }
        self.media.set_position(position);
    }

    /// Run the sampling loop: one observation per interval tick plus one per
    /// media event, until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut events = self.media.subscribe_events();
        let mut tick = tokio::time::interval(self.options.sampling_interval());
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = events.recv() => {
                    match event {
                        Some(event) => self.sample(Some(event)),
                        None => break,
                    }
                }
                _ = tick.tick() => self.sample(None),
            }
        }
    }

    fn sample(&self, event: Option<MediaEvent>) {
        let position = self.media.position();
        let buffered = self.media.buffered();
        let duration = self.media.duration();
        let buffer_gap = buffered.buffer_gap(position);
        let ready_state = self.media.ready_state();
        let paused = self.media.paused();
        let seeking = self.media.seeking();
        let ended = self.media.ended();
        let playback_rate = self.media.playback_rate();
        let timestamp = self.epoch.elapsed();

        let fully_loaded = duration.is_some_and(|d| {
            buffered
                .as_slice()
                .last()
                .is_some_and(|r| d - r.end <= CONTIGUOUS_EPSILON)
        });

        let snapshot = Snapshot {
            position,
            buffer_gap,
            ready_state,
            paused,
            seeking,
            ended,
            playback_rate,
            fully_loaded,
            event,
        };

        let (rebuffering, freezing, internal_seek) = {
            let mut inner = self.inner.lock();

            let internal_seek = if event == Some(MediaEvent::Seeking)
                && inner.pending_internal_seeks > 0
            {
                inner.pending_internal_seeks -= 1;
                inner.last_internal_seek_at =
                    (inner.pending_internal_seeks > 0).then(Instant::now);
                true
            } else {
                self.reconcile_internal_seeks(&mut inner);
                false
            };

            let (rebuffering, freezing) = inner.tracker.update(&self.options, &snapshot, timestamp);
            (rebuffering, freezing, internal_seek)
        };

        let _ = self.obs_tx.send(Observation {
            position,
            buffer_gap,
            buffered,
            duration,
            playback_rate,
            ready_state,
            paused,
            seeking,
            ended,
            event,
            rebuffering,
            freezing,
            internal_seek,
            timestamp,
        });
    }

    /// The host may coalesce rapid seeks into a single `seeking` event,
    /// leaving the counter stuck positive. Decrement after a timeout.
    fn reconcile_internal_seeks(&self, inner: &mut ObserverInner) {
        let Some(at) = inner.last_internal_seek_at else {
            return;
        };
        if inner.pending_internal_seeks > 0 && at.elapsed() >= self.options.internal_seek_timeout {
            inner.pending_internal_seeks -= 1;
            inner.last_internal_seek_at = (inner.pending_internal_seeks > 0).then(Instant::now);
            trace!(
                remaining = inner.pending_internal_seeks,
                "reconciled unacknowledged internal seek"
            );
        }
    }
}
