use async_trait::async_trait;
use aulos_ranges::TimeRanges;
use thiserror::Error;

/// Media element events the observer reacts to between sampling ticks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MediaEvent {
    CanPlay,
    Play,
    Pause,
    Seeking,
    Seeked,
    LoadedMetadata,
    RateChange,
    TimeUpdate,
    Ended,
}

/// `play()` failures, surfaced as values rather than exceptions.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum PlayError {
    /// The host refused to start playback (autoplay policy).
    #[error("playback not allowed by host policy")]
    NotAllowed,
    /// The media cannot be played at all.
    #[error("media not supported")]
    NotSupported,
    #[error("play failed: {0}")]
    Other(String),
}

/// Abstract host media element.
///
/// The engine never touches the real element directly; everything it needs
/// is behind this seam so tests can script arbitrary playback trajectories.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait MediaElement: Send + Sync {
    /// Current playback position, in seconds.
    fn position(&self) -> f64;

    /// Media duration in seconds, when known.
    fn duration(&self) -> Option<f64>;

    /// Currently buffered time ranges.
    fn buffered(&self) -> TimeRanges;

    /// HTMLMediaElement-style ready state, `0..=4`.
    fn ready_state(&self) -> u8;

    fn paused(&self) -> bool;

    fn seeking(&self) -> bool;

    fn ended(&self) -> bool;

    fn playback_rate(&self) -> f64;

    fn set_playback_rate(&self, rate: f64);

    /// Seek the element. The observer wraps this to tag internal seeks.
    fn set_position(&self, position: f64);

    /// Attempt to start playback.
    async fn play(&self) -> Result<(), PlayError>;

    /// Receive media events. Each call returns an independent receiver.
    fn subscribe_events(&self) -> tokio::sync::mpsc::UnboundedReceiver<MediaEvent>;
}
