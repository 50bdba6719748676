/// Playback lifecycle events.
#[derive(Clone, Debug)]
pub enum PlayerEvent {
    /// Playback halted, waiting for buffer.
    Stalled { reason: String },
    /// Playback resumed after a stall.
    Unstalled,
    /// All streams finished; the content played to its end.
    EndOfStream,
    /// Playback resumed after a full reload.
    ResumeStream,
    /// The host refused autoplay; playback waits for a user gesture.
    AutoplayBlocked,
    /// Latest network bitrate estimate changed.
    BitrateEstimationChange { bitrate: Option<u64> },
    /// Recoverable problem worth surfacing.
    Warning { message: String },
}
