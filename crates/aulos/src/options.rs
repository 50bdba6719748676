use aulos_abr::AbrOptions;
use aulos_clock::ClockOptions;
use aulos_fetch::FetchOptions;
use aulos_net::{CdnOptions, NetOptions};
use aulos_sink::QueueOptions;
use aulos_stream::StreamOptions;

use crate::init::StartAt;

/// Unified engine configuration.
///
/// One struct per subsystem, each with its own defaults; `with_*` builders
/// for the common overrides.
#[derive(Clone, Debug)]
pub struct AulosParams {
    pub clock: ClockOptions,
    pub net: NetOptions,
    pub cdn: CdnOptions,
    pub abr: AbrOptions,
    pub fetch: FetchOptions,
    pub stream: StreamOptions,
    pub queue: QueueOptions,
    /// Seconds of buffer to build ahead of the playhead.
    pub wanted_buffer_ahead: f64,
    /// Where playback starts; `None` starts at the first position.
    pub start_at: Option<StartAt>,
    /// Attempt to start playback as soon as the content is playable.
    pub autoplay: bool,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for AulosParams {
    fn default() -> Self {
        Self::new()
    }
}

impl AulosParams {
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock: ClockOptions::default(),
            net: NetOptions::default(),
            cdn: CdnOptions::default(),
            abr: AbrOptions::default(),
            fetch: FetchOptions::default(),
            stream: StreamOptions::default(),
            queue: QueueOptions::default(),
            wanted_buffer_ahead: 30.0,
            start_at: None,
            autoplay: false,
            event_capacity: 64,
        }
    }

    /// Low-latency profile: chunked transport, tight rebuffer gaps, fast
    /// sampling.
    #[must_use]
    pub fn low_latency(mut self) -> Self {
        self.clock.low_latency = true;
        self.fetch.low_latency = true;
        self
    }

    #[must_use]
    pub fn with_net(mut self, net: NetOptions) -> Self {
        self.net = net;
        self
    }

    #[must_use]
    pub fn with_abr(mut self, abr: AbrOptions) -> Self {
        self.abr = abr;
        self
    }

    #[must_use]
    pub fn with_start_at(mut self, start_at: StartAt) -> Self {
        self.start_at = Some(start_at);
        self
    }

    #[must_use]
    pub fn with_autoplay(mut self, autoplay: bool) -> Self {
        self.autoplay = autoplay;
        self
    }

    #[must_use]
    pub fn with_wanted_buffer_ahead(mut self, seconds: f64) -> Self {
        self.wanted_buffer_ahead = seconds;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_latency_profile_aligns_subsystems() {
        let params = AulosParams::new().low_latency();
        assert!(params.clock.low_latency);
        assert!(params.fetch.low_latency);
    }

    #[test]
    fn default_is_not_low_latency() {
        let params = AulosParams::new();
        assert!(!params.clock.low_latency);
        assert!(!params.fetch.low_latency);
    }
}
