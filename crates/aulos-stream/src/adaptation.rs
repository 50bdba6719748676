use std::sync::Arc;

use aulos_abr::AbrEstimator;
use aulos_clock::Observation;
use aulos_events::{EventBus, StreamEvent};
use aulos_fetch::SegmentFetcher;
use aulos_media::{
    AdaptationId, Manifest, PeriodId, Representation, SharedReference, TrackKind,
};
use aulos_ranges::{TimeRange, TimeRanges};
use aulos_sink::SinkQueue;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    RepresentationStream, RepresentationStreamContext, SegmentParser, StreamError, StreamOptions,
    StreamResult,
};

/// How to apply a representation switch on a live sink.
#[derive(Clone, Debug, PartialEq)]
pub enum SwitchStrategy {
    /// Swap streams; already-buffered data stays.
    Continue,
    /// Remove these ranges first (quality upgrade ahead of the playhead).
    CleanBuffer { remove: Vec<TimeRange> },
    /// The sink cannot take the new representation at all.
    NeedsReload,
}

/// Decide how to move from `current` to `next` on the same sink.
///
/// Codec-family or container changes need a media-source reload; urgent
/// switches flush buffered data ahead of the playhead so the new quality
/// shows up immediately; everything else just swaps at the buffer edge.
#[must_use]
pub fn switch_strategy(
    current: &Representation,
    next: &Representation,
    observation: &Observation,
    buffered: &TimeRanges,
    urgent: bool,
    switch_margin: f64,
) -> SwitchStrategy {
    if codec_family(&current.codec) != codec_family(&next.codec) || current.mime != next.mime {
        return SwitchStrategy::NeedsReload;
    }

    if urgent {
        let keep_until = observation.position + switch_margin;
        let remove: Vec<TimeRange> = buffered
            .as_slice()
            .iter()
            .filter_map(|r| {
                let start = r.start.max(keep_until);
                (start < r.end).then(|| TimeRange::new(start, r.end))
            })
            .collect();
        if !remove.is_empty() {
            return SwitchStrategy::CleanBuffer { remove };
        }
    }

    SwitchStrategy::Continue
}

fn codec_family(codec: &str) -> &str {
    codec.split('.').next().unwrap_or(codec)
}

/// Everything one adaptation stream needs.
#[derive(Clone)]
pub struct AdaptationStreamContext {
    pub manifest: Arc<Manifest>,
    pub period: PeriodId,
    pub adaptation: AdaptationId,
    pub kind: TrackKind,
    pub sink: Arc<SinkQueue>,
    pub fetcher: Arc<SegmentFetcher>,
    pub parser: Arc<dyn SegmentParser>,
    pub abr: Arc<AbrEstimator>,
    pub observations: watch::Receiver<Observation>,
    pub wanted_buffer_ahead: SharedReference<f64>,
    pub events: EventBus,
    pub options: StreamOptions,
}

/// Runs one representation stream at a time, switching on ABR decisions.
pub struct AdaptationStream {
    ctx: AdaptationStreamContext,
}

impl AdaptationStream {
    #[must_use]
    pub fn new(ctx: AdaptationStreamContext) -> Self {
        Self { ctx }
    }

    /// Run until cancelled, a fatal error, or a reload request.
    ///
    /// Returns `Ok(())` after publishing `NeedsMediaSourceReload`; the
    /// orchestrator rebuilds everything from scratch in that case.
    pub async fn run(&self, cancel: CancellationToken) -> StreamResult<()> {
        let mut decision_rx = self.ctx.abr.subscribe();

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let decision = *decision_rx.borrow_and_update();
            let representation = self
                .ctx
                .manifest
                .representation(decision.representation)
                .ok_or(StreamError::UnknownRepresentation(decision.representation))?
                .clone();
            self.ctx.abr.set_current(representation.id);

            let child_cancel = cancel.child_token();
            let rep_stream = RepresentationStream::new(self.representation_context(&representation));
            let run = rep_stream.run(child_cancel.clone());
            tokio::pin!(run);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        child_cancel.cancel();
                        return Ok(());
                    }
                    result = &mut run => {
                        // The inner stream only returns on cancellation or
                        // a terminal error.
                        result?;
                        return Ok(());
                    }
                    changed = decision_rx.changed() => {
                        if changed.is_err() {
                            child_cancel.cancel();
                            return Ok(());
                        }
                        let new = *decision_rx.borrow();
                        if new.representation == representation.id {
                            continue;
                        }
                        let Some(next) = self.ctx.manifest.representation(new.representation)
                        else {
                            return Err(StreamError::UnknownRepresentation(new.representation));
                        };

                        let observation = self.ctx.observations.borrow().clone();
                        let strategy = switch_strategy(
                            &representation,
                            next,
                            &observation,
                            &self.ctx.sink.buffered(),
                            new.urgent,
                            self.ctx.options.switch_margin,
                        );
                        info!(
                            from = %representation.id,
                            to = %next.id,
                            ?strategy,
                            urgent = new.urgent,
                            "applying representation switch"
                        );
                        child_cancel.cancel();

                        match strategy {
                            SwitchStrategy::NeedsReload => {
                                self.ctx.events.publish(StreamEvent::NeedsMediaSourceReload {
                                    position: observation.position,
                                    auto_play: !observation.paused,
                                });
                                return Ok(());
                            }
                            SwitchStrategy::CleanBuffer { remove } => {
                                drop(run);
                                for range in remove {
                                    debug!(start = range.start, end = range.end, "cleaning buffer for switch");
                                    self.ctx.sink.remove(range.start, range.end).await?;
                                }
                                break;
                            }
                            SwitchStrategy::Continue => {
                                drop(run);
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    fn representation_context(
        &self,
        representation: &Representation,
    ) -> RepresentationStreamContext {
        RepresentationStreamContext {
            manifest: self.ctx.manifest.clone(),
            period: self.ctx.period,
            adaptation: self.ctx.adaptation,
            kind: self.ctx.kind,
            representation: representation.clone(),
            sink: self.ctx.sink.clone(),
            fetcher: self.ctx.fetcher.clone(),
            parser: self.ctx.parser.clone(),
            abr: self.ctx.abr.clone(),
            observations: self.ctx.observations.clone(),
            wanted_buffer_ahead: self.ctx.wanted_buffer_ahead.clone(),
            events: self.ctx.events.clone(),
            options: self.ctx.options.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use aulos_media::{RepresentationId, TimelineIndex};
    use url::Url;

    use super::*;

    fn representation(id: u32, bitrate: u64, codec: &str, mime: &str) -> Representation {
        let base = Url::parse("https://cdn.example/rep/").unwrap();
        Representation {
            id: RepresentationId(id),
            bitrate,
            codec: codec.to_string(),
            mime: mime.to_string(),
            index: Arc::new(TimelineIndex::uniform(&base, 0.0, 4.0, 5, None)),
        }
    }

    fn observation_at(position: f64) -> Observation {
        Observation {
            position,
            ..Observation::initial()
        }
    }

    fn buffered(ranges: &[(f64, f64)]) -> TimeRanges {
        let mut out = TimeRanges::new();
        for &(s, e) in ranges {
            out.insert(TimeRange::new(s, e));
        }
        out
    }

    #[test]
    fn same_codec_family_continues() {
        let a = representation(0, 300_000, "avc1.4d401e", "video/mp4");
        let b = representation(1, 800_000, "avc1.64001f", "video/mp4");
        let strategy = switch_strategy(&a, &b, &observation_at(5.0), &buffered(&[]), false, 1.0);
        assert_eq!(strategy, SwitchStrategy::Continue);
    }

    #[test]
    fn codec_family_change_needs_reload() {
        let a = representation(0, 300_000, "avc1.4d401e", "video/mp4");
        let b = representation(1, 800_000, "hvc1.1.6.L93.B0", "video/mp4");
        let strategy = switch_strategy(&a, &b, &observation_at(5.0), &buffered(&[]), true, 1.0);
        assert_eq!(strategy, SwitchStrategy::NeedsReload);
    }

    #[test]
    fn container_change_needs_reload() {
        let a = representation(0, 300_000, "vp9", "video/mp4");
        let b = representation(1, 800_000, "vp9", "video/webm");
        let strategy = switch_strategy(&a, &b, &observation_at(5.0), &buffered(&[]), false, 1.0);
        assert_eq!(strategy, SwitchStrategy::NeedsReload);
    }

    #[test]
    fn urgent_switch_cleans_ahead_of_playhead() {
        let a = representation(0, 300_000, "avc1.4d401e", "video/mp4");
        let b = representation(1, 800_000, "avc1.4d401e", "video/mp4");
        let strategy = switch_strategy(
            &a,
            &b,
            &observation_at(10.0),
            &buffered(&[(0.0, 30.0)]),
            true,
            1.0,
        );
        match strategy {
            SwitchStrategy::CleanBuffer { remove } => {
                assert_eq!(remove, vec![TimeRange::new(11.0, 30.0)]);
            }
            other => panic!("expected CleanBuffer, got {other:?}"),
        }
    }

    #[test]
    fn urgent_switch_with_nothing_ahead_continues() {
        let a = representation(0, 300_000, "avc1.4d401e", "video/mp4");
        let b = representation(1, 800_000, "avc1.4d401e", "video/mp4");
        let strategy = switch_strategy(
            &a,
            &b,
            &observation_at(50.0),
            &buffered(&[(0.0, 30.0)]),
            true,
            1.0,
        );
        assert_eq!(strategy, SwitchStrategy::Continue);
    }
}
