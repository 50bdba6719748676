use std::sync::Arc;

use aulos_abr::{AbrEstimator, RepresentationInfo};
use aulos_clock::Observation;
use aulos_events::{EventBus, StreamEvent};
use aulos_fetch::SegmentFetcher;
use aulos_media::{AdaptationId, Manifest, PeriodId, SharedReference, TrackKind};
use aulos_ranges::TimeRange;
use aulos_sink::SinkQueue;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    AdaptationStream, AdaptationStreamContext, SegmentParser, StreamError, StreamOptions,
    StreamResult,
};

/// Everything one period stream needs for one track kind.
#[derive(Clone)]
pub struct PeriodStreamContext {
    pub manifest: Arc<Manifest>,
    pub period: PeriodId,
    pub kind: TrackKind,
    /// Exclusively owned by this period stream.
    pub sink: Arc<SinkQueue>,
    pub fetcher: Arc<SegmentFetcher>,
    pub parser: Arc<dyn SegmentParser>,
    /// Shared across representation streams of this track kind.
    pub abr: Arc<AbrEstimator>,
    pub observations: watch::Receiver<Observation>,
    pub wanted_buffer_ahead: SharedReference<f64>,
    /// Which adaptation (track) to play; `None` disables the kind.
    pub track_choice: SharedReference<Option<AdaptationId>>,
    pub events: EventBus,
    pub options: StreamOptions,
}

/// Supervises one track kind of one period.
///
/// Owns the sink lifecycle, applies track changes, garbage-collects the
/// buffer, reacts to decipherability updates, and demotes non-native track
/// failures to warnings.
pub struct PeriodStream {
    ctx: PeriodStreamContext,
}

impl PeriodStream {
    #[must_use]
    pub fn new(ctx: PeriodStreamContext) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, cancel: CancellationToken) -> StreamResult<()> {
        self.ctx.events.publish(StreamEvent::PeriodStreamReady {
            period: self.ctx.period,
            kind: self.ctx.kind,
        });

        let mut choice_rx = self.ctx.track_choice.subscribe();
        let mut decipher_rx = self.ctx.manifest.decipherability_updates();
        let mut obs_rx = self.ctx.observations.clone();

        'track: loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let choice = *choice_rx.borrow_and_update();
            self.ctx.events.publish(StreamEvent::AdaptationChange {
                period: self.ctx.period,
                kind: self.ctx.kind,
                adaptation: choice,
            });

            let Some(adaptation) = choice else {
                // Disabled track: idle until re-enabled.
                tokio::select! {
                    () = cancel.cancelled() => return Ok(()),
                    changed = choice_rx.changed() => {
                        if changed.is_err() {
                            return Ok(());
                        }
                    }
                }
                continue 'track;
            };

            self.refresh_ladder(adaptation)?;

            let child_cancel = cancel.child_token();
            let adaptation_stream = AdaptationStream::new(self.adaptation_context(adaptation));
            let run = async { adaptation_stream.run(child_cancel.clone()).await };
            tokio::pin!(run);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        child_cancel.cancel();
                        return Ok(());
                    }
                    result = &mut run => {
                        match result {
                            Ok(()) => return Ok(()),
                            Err(error) => {
                                let restart = self
                                    .handle_stream_error(error, &cancel, &mut choice_rx)
                                    .await?;
                                if restart {
                                    drop(run);
                                    self.clear_buffer().await?;
                                    self.ctx.sink.reset_init_state();
                                    continue 'track;
                                }
                                return Ok(());
                            }
                        }
                    }
                    changed = choice_rx.changed() => {
                        if changed.is_err() {
                            child_cancel.cancel();
                            return Ok(());
                        }
                        debug!(kind = %self.ctx.kind, "track choice changed, rebuilding");
                        child_cancel.cancel();
                        drop(run);
                        self.clear_buffer().await?;
                        self.ctx.sink.reset_init_state();
                        continue 'track;
                    }
                    update = decipher_rx.recv() => {
                        if let Ok(changed) = update {
                            if self.apply_decipherability_update(adaptation, &changed)? {
                                child_cancel.cancel();
                                drop(run);
                                self.clear_buffer().await?;
                                self.ctx.sink.reset_init_state();
                                continue 'track;
                            }
                        }
                    }
                    changed = obs_rx.changed() => {
                        if changed.is_ok() {
                            let observation = obs_rx.borrow_and_update().clone();
                            self.enforce_buffer_limits(&observation).await?;
                        }
                    }
                }
            }
        }
    }

    /// Push the playable ladder of `adaptation` into the ABR estimator.
    fn refresh_ladder(&self, adaptation: AdaptationId) -> StreamResult<()> {
        if self.ctx.manifest.adaptation(adaptation).is_none() {
            return Err(StreamError::UnknownAdaptation(adaptation));
        }
        let ladder: Vec<RepresentationInfo> = self
            .ctx
            .manifest
            .playable_representations_of(adaptation)
            .iter()
            .map(|r| RepresentationInfo {
                id: r.id,
                bitrate: r.bitrate,
            })
            .collect();
        if ladder.is_empty() {
            return Err(StreamError::NoPlayableRepresentation);
        }
        self.ctx.abr.update_ladder(ladder);
        Ok(())
    }

    /// Returns `true` when the current adaptation is affected and its
    /// buffered data must be flushed.
    fn apply_decipherability_update(
        &self,
        adaptation: AdaptationId,
        changed: &[aulos_media::RepresentationId],
    ) -> StreamResult<bool> {
        let members: Vec<_> = self
            .ctx
            .manifest
            .representations_of(adaptation)
            .iter()
            .map(|r| r.id)
            .collect();
        if !changed.iter().any(|id| members.contains(id)) {
            return Ok(false);
        }

        self.refresh_ladder(adaptation)?;
        let buffered = self.ctx.sink.buffered();
        if !buffered.is_empty() {
            self.ctx
                .events
                .publish(StreamEvent::NeedsDecipherabilityFlush { ranges: buffered });
        }
        Ok(true)
    }

    async fn clear_buffer(&self) -> StreamResult<()> {
        let buffered = self.ctx.sink.buffered();
        if buffered.is_empty() {
            return Ok(());
        }
        self.ctx.events.publish(StreamEvent::NeedsBufferFlush);
        for range in buffered.as_slice() {
            self.ctx.sink.remove(range.start, range.end).await?;
        }
        Ok(())
    }

    /// Enforce `max_buffer_behind` / `max_buffer_ahead`.
    async fn enforce_buffer_limits(&self, observation: &Observation) -> StreamResult<()> {
        let position = observation.position;
        let mut to_remove: Vec<TimeRange> = Vec::new();

        if let Some(behind) = self.ctx.options.max_buffer_behind {
            let cut = position - behind;
            for range in self.ctx.sink.buffered().as_slice() {
                if range.start < cut {
                    to_remove.push(TimeRange::new(range.start, range.end.min(cut)));
                }
            }
        }
        if let Some(ahead) = self.ctx.options.max_buffer_ahead {
            let cut = position + ahead;
            for range in self.ctx.sink.buffered().as_slice() {
                if range.end > cut {
                    to_remove.push(TimeRange::new(range.start.max(cut), range.end));
                }
            }
        }

        for range in to_remove {
            if range.duration() > aulos_ranges::CONTIGUOUS_EPSILON {
                debug!(start = range.start, end = range.end, "garbage-collecting buffer");
                self.ctx.sink.remove(range.start, range.end).await?;
            }
        }
        Ok(())
    }

    /// Fatal native errors propagate (sink death becomes a reload request);
    /// non-native tracks degrade to an empty stream plus a warning.
    ///
    /// Returns `true` when the track loop should restart (the user picked a
    /// new track while the kind sat in its degraded state).
    async fn handle_stream_error(
        &self,
        error: StreamError,
        cancel: &CancellationToken,
        choice_rx: &mut watch::Receiver<Option<AdaptationId>>,
    ) -> StreamResult<bool> {
        if self.ctx.kind.is_native() {
            if let StreamError::Sink(sink_error) = &error {
                if sink_error.is_fatal() {
                    let observation = self.ctx.observations.borrow().clone();
                    warn!(kind = %self.ctx.kind, error = %sink_error, "sink died, requesting reload");
                    self.ctx.events.publish(StreamEvent::NeedsMediaSourceReload {
                        position: observation.position,
                        auto_play: !observation.paused,
                    });
                    return Ok(false);
                }
            }
            return Err(error);
        }

        warn!(kind = %self.ctx.kind, error = %error, "non-native stream failed, continuing without it");
        self.ctx.events.publish(StreamEvent::Warning {
            message: format!("{} stream disabled after error: {error}", self.ctx.kind),
        });

        // Empty stream: position advances normally without this track.
        tokio::select! {
            () = cancel.cancelled() => Ok(false),
            changed = choice_rx.changed() => Ok(changed.is_ok()),
        }
    }

    fn adaptation_context(&self, adaptation: AdaptationId) -> AdaptationStreamContext {
        AdaptationStreamContext {
            manifest: self.ctx.manifest.clone(),
            period: self.ctx.period,
            adaptation,
            kind: self.ctx.kind,
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
