use crate::{PlayerEvent, StreamEvent};

/// Unified event for the whole engine.
#[derive(Clone, Debug)]
pub enum Event {
    /// Playback lifecycle event.
    Player(PlayerEvent),
    /// Stream orchestration event.
    Stream(StreamEvent),
}

impl From<PlayerEvent> for Event {
    fn from(e: PlayerEvent) -> Self {
        Self::Player(e)
    }
}

impl From<StreamEvent> for Event {
    fn from(e: StreamEvent) -> Self {
        Self::Stream(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_event_into_event() {
        let event: Event = PlayerEvent::EndOfStream.into();
        assert!(matches!(event, Event::Player(PlayerEvent::EndOfStream)));
    }

    #[test]
    fn stream_event_into_event() {
        let event: Event = StreamEvent::NeedsManifestRefresh.into();
        assert!(matches!(
            event,
            Event::Stream(StreamEvent::NeedsManifestRefresh)
        ));
    }
}
