//! Scripted media element for driving playback scenarios.

use async_trait::async_trait;
use aulos_clock::{MediaElement, MediaEvent, PlayError};
use aulos_ranges::{TimeRange, TimeRanges};
use parking_lot::Mutex;

#[derive(Debug)]
struct State {
    position: f64,
    duration: Option<f64>,
    buffered: TimeRanges,
    ready_state: u8,
    paused: bool,
    seeking: bool,
    ended: bool,
    playback_rate: f64,
    block_autoplay: bool,
    play_calls: u32,
}

/// Media element whose state tests mutate directly.
///
/// Event receivers get whatever the test pushes; `play()` can be scripted
/// to fail with the autoplay-blocked error.
pub struct FakeMediaElement {
    state: Mutex<State>,
    event_txs: Mutex<Vec<tokio::sync::mpsc::UnboundedSender<MediaEvent>>>,
}

impl Default for FakeMediaElement {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeMediaElement {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                position: 0.0,
                duration: None,
                buffered: TimeRanges::new(),
                ready_state: 0,
                paused: true,
                seeking: false,
                ended: false,
                playback_rate: 1.0,
                block_autoplay: false,
                play_calls: 0,
            }),
            event_txs: Mutex::new(Vec::new()),
        }
    }

    pub fn push_event(&self, event: MediaEvent) {
        self.event_txs.lock().retain(|tx| tx.send(event).is_ok());
    }

    pub fn set_ready_state(&self, ready_state: u8) {
        self.state.lock().ready_state = ready_state;
    }

    pub fn set_duration(&self, duration: f64) {
        self.state.lock().duration = Some(duration);
    }

    pub fn set_buffered_range(&self, start: f64, end: f64) {
        let mut ranges = TimeRanges::new();
        ranges.insert(TimeRange::new(start, end));
        self.state.lock().buffered = ranges;
    }

    pub fn add_buffered_range(&self, start: f64, end: f64) {
        self.state.lock().buffered.insert(TimeRange::new(start, end));
    }

    pub fn set_ended(&self, ended: bool) {
        self.state.lock().ended = ended;
    }

    pub fn finish_seek(&self) {
        self.state.lock().seeking = false;
    }

    pub fn block_autoplay(&self) {
        self.state.lock().block_autoplay = true;
    }

    #[must_use]
    pub fn play_calls(&self) -> u32 {
        self.state.lock().play_calls
    }

    pub fn advance_position(&self, delta: f64) {
        self.state.lock().position += delta;
    }
}

#[async_trait]
impl MediaElement for FakeMediaElement {
    fn position(&self) -> f64 {
        self.state.lock().position
    }

    fn duration(&self) -> Option<f64> {
        self.state.lock().duration
    }

    fn buffered(&self) -> TimeRanges {
        self.state.lock().buffered.clone()
    }

    fn ready_state(&self) -> u8 {
        self.state.lock().ready_state
    }

    fn paused(&self) -> bool {
        self.state.lock().paused
    }

    fn seeking(&self) -> bool {
        self.state.lock().seeking
    }

    fn ended(&self) -> bool {
        self.state.lock().ended
    }

    fn playback_rate(&self) -> f64 {
        self.state.lock().playback_rate
    }

    fn set_playback_rate(&self, rate: f64) {
        self.state.lock().playback_rate = rate;
    }

    fn set_position(&self, position: f64) {
        let mut state = self.state.lock();
        state.position = position;
        state.seeking = true;
    }

    async fn play(&self) -> Result<(), PlayError> {
        let mut state = self.state.lock();
        state.play_calls += 1;
        if state.block_autoplay {
            return Err(PlayError::NotAllowed);
        }
        state.paused = false;
        Ok(())
    }

    fn subscribe_events(&self) -> tokio::sync::mpsc::UnboundedReceiver<MediaEvent> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        self.event_txs.lock().push(tx);
        rx
    }
}
