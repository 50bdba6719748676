use std::sync::Arc;

use aulos_clock::{MediaElement, PlayError, PlaybackObserver};
use aulos_events::{EventBus, PlayerEvent};
use aulos_ranges::CONTIGUOUS_EPSILON;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{AulosError, AulosResult};

/// Where playback starts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StartAt {
    /// Absolute presentation position, seconds.
    Position(f64),
    /// Wall-clock time (unix seconds), for live content.
    WallClock(f64),
    /// Offset from the earliest reachable position.
    FromFirstPosition(f64),
    /// Offset back from the latest reachable position.
    FromLastPosition(f64),
    /// Percentage of the content duration, `0..=100`.
    Percentage(f64),
}

impl StartAt {
    /// Resolve to a presentation position.
    ///
    /// `first` and `last` bound the seekable window;
    /// `availability_start_time` anchors wall-clock times.
    #[must_use]
    pub fn resolve(self, first: f64, last: f64, availability_start_time: f64) -> f64 {
        match self {
            Self::Position(position) => position,
            Self::WallClock(wall) => wall - availability_start_time,
            Self::FromFirstPosition(offset) => first + offset.max(0.0),
            Self::FromLastPosition(offset) => last - offset.max(0.0),
            Self::Percentage(pct) => {
                if pct <= 0.0 {
                    first
                } else if pct >= 100.0 {
                    last
                } else {
                    first + (last - first) * (pct / 100.0)
                }
            }
        }
    }
}

/// What happened to the initial play attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AutoplayOutcome {
    /// Playback started.
    Performed,
    /// Autoplay was off, or the media had already ended.
    Skipped,
    /// The host's autoplay policy refused; waiting for a user gesture.
    Blocked,
}

/// Initialization phases, observable for tests and UIs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InitPhase {
    Initializing,
    SeekPending,
    WaitingPlayable,
    Playing,
    Rebuffering,
}

/// Result of the initialization sequence.
#[derive(Clone, Debug)]
pub struct InitResult {
    pub initial_position: Option<f64>,
    pub autoplay: AutoplayOutcome,
    /// The initial play stage ran to completion (even if blocked).
    pub initial_play_performed: bool,
}

/// Initialization configuration.
#[derive(Clone, Debug)]
pub struct InitOptions {
    pub start_at: Option<StartAt>,
    pub autoplay: bool,
    /// Anchor for `StartAt::WallClock`, unix seconds.
    pub availability_start_time: f64,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            start_at: None,
            autoplay: false,
            availability_start_time: 0.0,
        }
    }
}

/// Drives the start of playback: initial seek once metadata is known,
/// waiting until playable, the autoplay attempt, and playback-rate zeroing
/// during rebuffers.
pub struct InitOrchestrator {
    media: Arc<dyn MediaElement>,
    observer: Arc<PlaybackObserver>,
    events: EventBus,
    options: InitOptions,
    phase_tx: watch::Sender<InitPhase>,
}

impl InitOrchestrator {
    #[must_use]
    pub fn new(
        media: Arc<dyn MediaElement>,
        observer: Arc<PlaybackObserver>,
        events: EventBus,
        options: InitOptions,
    ) -> Self {
        let (phase_tx, _) = watch::channel(InitPhase::Initializing);
        Self {
            media,
            observer,
            events,
            options,
            phase_tx,
        }
    }

    /// Observe initialization phases.
    #[must_use]
    pub fn phases(&self) -> watch::Receiver<InitPhase> {
        self.phase_tx.subscribe()
    }

    fn set_phase(&self, phase: InitPhase) {
        self.phase_tx.send_if_modified(|slot| {
            if *slot == phase {
                false
            } else {
                debug!(?phase, "init phase");
                *slot = phase;
                true
            }
        });
    }

    /// Run the init sequence: seek, wait playable, autoplay.
    ///
    /// `content_duration` comes from the manifest when it knows better than
    /// the media element.
    pub async fn initialize(
        &self,
        content_duration: Option<f64>,
        cancel: &CancellationToken,
    ) -> AulosResult<InitResult> {
        let mut obs_rx = self.observer.subscribe();

        // Metadata first: the duration and seekable window are unknown
        // until then.
        self.set_phase(InitPhase::Initializing);
        loop {
            let ready = {
                let obs = obs_rx.borrow_and_update();
                obs.ready_state >= 1 || obs.duration.is_some()
            };
            if ready {
                break;
            }
            tokio::select! {
                () = cancel.cancelled() => return Err(AulosError::Cancelled),
                changed = obs_rx.changed() => {
                    if changed.is_err() {
                        return Err(AulosError::Cancelled);
                    }
                }
            }
        }

        // Initial seek.
        self.set_phase(InitPhase::SeekPending);
        let duration = content_duration
            .or(obs_rx.borrow().duration)
            .unwrap_or(0.0);
        let initial_position = self.options.start_at.map(|start_at| {
            start_at.resolve(0.0, duration, self.options.availability_start_time)
        });
        if let Some(position) = initial_position {
            let current = obs_rx.borrow().position;
            if (position - current).abs() > CONTIGUOUS_EPSILON {
                info!(position, "initial seek");
                self.observer.set_current_time(position);
            }
        }

        // Wait until the content is actually playable.
        self.set_phase(InitPhase::WaitingPlayable);
        loop {
            let playable = {
                let obs = obs_rx.borrow_and_update();
                obs.ready_state >= 1 && obs.rebuffering.is_none() && !obs.seeking
            };
            if playable {
                break;
            }
            tokio::select! {
                () = cancel.cancelled() => return Err(AulosError::Cancelled),
                changed = obs_rx.changed() => {
                    if changed.is_err() {
                        return Err(AulosError::Cancelled);
                    }
                }
            }
        }

        // Autoplay.
        let ended = obs_rx.borrow().ended;
        let autoplay = self.attempt_autoplay(ended).await?;
        self.set_phase(InitPhase::Playing);

        Ok(InitResult {
            initial_position,
            autoplay,
            initial_play_performed: true,
        })
    }

    async fn attempt_autoplay(&self, ended: bool) -> AulosResult<AutoplayOutcome> {
        if !self.options.autoplay || ended {
            return Ok(AutoplayOutcome::Skipped);
        }
        match self.media.play().await {
            Ok(()) => Ok(AutoplayOutcome::Performed),
            Err(PlayError::NotAllowed) => {
                warn!("autoplay blocked by host policy");
                self.events.publish(PlayerEvent::AutoplayBlocked);
                self.events.publish(PlayerEvent::Warning {
                    message: "autoplay blocked; waiting for user interaction".to_string(),
                });
                Ok(AutoplayOutcome::Blocked)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Zero the playback rate while rebuffering and restore the user's rate
    /// afterwards. Runs until cancelled.
    pub async fn supervise_playback_rate(&self, cancel: &CancellationToken) {
        let mut obs_rx = self.observer.subscribe();
        let mut stalled = false;
        let mut user_rate = 1.0;

        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                changed = obs_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }

            let (rebuffering, rate) = {
                let obs = obs_rx.borrow_and_update();
                (obs.rebuffering, obs.playback_rate)
            };

            match (rebuffering, stalled) {
                (Some(rebuffering), false) => {
                    stalled = true;
                    if rate > 0.0 {
                        user_rate = rate;
                    }
                    self.set_phase(InitPhase::Rebuffering);
                    self.media.set_playback_rate(0.0);
                    self.events.publish(PlayerEvent::Stalled {
                        reason: format!("{:?}", rebuffering.reason),
                    });
                }
                (None, true) => {
                    stalled = false;
                    self.set_phase(InitPhase::Playing);
                    self.media.set_playback_rate(user_rate);
                    self.events.publish(PlayerEvent::Unstalled);
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::zero(0.0, 0.0)]
    #[case::negative_clamps_to_start(-20.0, 0.0)]
    #[case::half(50.0, 60.0)]
    #[case::full(100.0, 120.0)]
    #[case::above_full(150.0, 120.0)]
    fn percentage_resolution(#[case] pct: f64, #[case] expected: f64) {
        let position = StartAt::Percentage(pct).resolve(0.0, 120.0, 0.0);
        assert!((position - expected).abs() < 1e-9);
    }

    #[test]
    fn position_is_used_verbatim() {
        assert_eq!(StartAt::Position(42.5).resolve(0.0, 120.0, 0.0), 42.5);
    }

    #[test]
    fn wall_clock_is_anchored() {
        let position = StartAt::WallClock(1_700_000_060.0).resolve(0.0, 120.0, 1_700_000_000.0);
        assert!((position - 60.0).abs() < 1e-9);
    }

    #[test]
    fn from_first_and_last_offsets() {
        assert_eq!(StartAt::FromFirstPosition(5.0).resolve(10.0, 120.0, 0.0), 15.0);
        assert_eq!(StartAt::FromLastPosition(10.0).resolve(0.0, 120.0, 0.0), 110.0);
    }

    #[test]
    fn negative_offsets_are_clamped() {
        assert_eq!(StartAt::FromFirstPosition(-5.0).resolve(10.0, 120.0, 0.0), 10.0);
        assert_eq!(StartAt::FromLastPosition(-5.0).resolve(0.0, 120.0, 0.0), 120.0);
    }
}
