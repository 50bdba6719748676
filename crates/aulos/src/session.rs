use std::{collections::HashSet, sync::Arc};

use aulos_abr::{
    AbrEstimator, PlaybackSignal, RepresentationInfo, ThroughputSample, ThroughputSampleSource,
};
use aulos_clock::{MediaElement, PlaybackObserver};
use aulos_events::{Event, EventBus, PlayerEvent, StreamEvent};
use aulos_fetch::{MetricsSample, SegmentFetcher};
use aulos_media::{Manifest, Period, SharedReference, TrackKind};
use aulos_net::{BackoffPolicy, CdnPrioritizer, HttpClient};
use aulos_sink::{SegmentSink, SinkQueue};
use aulos_stream::{PeriodStream, PeriodStreamContext, SegmentParser};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use web_time::Instant;

use crate::{
    AulosError, AulosParams, AulosResult, InitOptions, InitOrchestrator, InitResult,
};

/// Everything a playback session needs from the host.
pub struct SessionContext {
    pub manifest: Arc<Manifest>,
    pub media: Arc<dyn MediaElement>,
    /// One sink per track kind to play.
    pub sinks: Vec<(TrackKind, Arc<dyn SegmentSink>)>,
    pub parser: Arc<dyn SegmentParser>,
    pub params: AulosParams,
}

struct KindStack {
    kind: TrackKind,
    abr: Arc<AbrEstimator>,
    fetcher: Arc<SegmentFetcher>,
    queue: Arc<SinkQueue>,
    track_choice: SharedReference<Option<aulos_media::AdaptationId>>,
    last_estimate: Option<u64>,
}

/// Wires the whole engine for one piece of content.
///
/// Construction performs no I/O; [`run`](Self::run) drives everything until
/// cancellation or a fatal error. Period streams are rebuilt when the
/// playhead crosses a period boundary and when a media-source reload is
/// requested.
pub struct Session {
    ctx: SessionContext,
    events: EventBus,
    observer: Arc<PlaybackObserver>,
    wanted_buffer_ahead: SharedReference<f64>,
}

impl Session {
    #[must_use]
    pub fn new(ctx: SessionContext) -> Self {
        let events = EventBus::new(ctx.params.event_capacity);
        let observer = Arc::new(PlaybackObserver::new(
            ctx.media.clone(),
            ctx.params.clock.clone(),
        ));
        let wanted_buffer_ahead = SharedReference::new(ctx.params.wanted_buffer_ahead);
        Self {
            ctx,
            events,
            observer,
            wanted_buffer_ahead,
        }
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    #[must_use]
    pub fn observer(&self) -> &Arc<PlaybackObserver> {
        &self.observer
    }

    /// User-adjustable buffer goal, live for the whole session.
    #[must_use]
    pub fn wanted_buffer_ahead(&self) -> &SharedReference<f64> {
        &self.wanted_buffer_ahead
    }

    /// Run playback until cancelled or a fatal error.
    pub async fn run(&self, cancel: CancellationToken) -> AulosResult<()> {
        if self.ctx.sinks.is_empty() {
            return Err(AulosError::NoSinks);
        }

        // Clock first: everything else keys off observations.
        let observer_task = {
            let observer = self.observer.clone();
            let cancel = cancel.child_token();
            tokio::spawn(async move { observer.run(cancel).await })
        };

        let init = InitOrchestrator::new(
            self.ctx.media.clone(),
            self.observer.clone(),
            self.events.clone(),
            InitOptions {
                start_at: self.ctx.params.start_at,
                autoplay: self.ctx.params.autoplay,
                availability_start_time: 0.0,
            },
        );
        let init_result = init.initialize(self.ctx.manifest.duration(), &cancel).await?;
        debug!(?init_result, "initialization complete");

        let rate_task = {
            let cancel = cancel.child_token();
            // The orchestrator is moved into the supervision task for the
            // rest of the session.
            tokio::spawn(async move { init.supervise_playback_rate(&cancel).await })
        };

        let result = self.run_period_loop(&cancel).await;

        cancel.cancel();
        let _ = observer_task.await;
        let _ = rate_task.await;
        result
    }

    /// Result of one initialization, for hosts that drive `run` themselves.
    pub async fn initialize_only(&self, cancel: &CancellationToken) -> AulosResult<InitResult> {
        let init = InitOrchestrator::new(
            self.ctx.media.clone(),
            self.observer.clone(),
            self.events.clone(),
            InitOptions {
                start_at: self.ctx.params.start_at,
                autoplay: self.ctx.params.autoplay,
                availability_start_time: 0.0,
            },
        );
        init.initialize(self.ctx.manifest.duration(), cancel).await
    }

    async fn run_period_loop(&self, cancel: &CancellationToken) -> AulosResult<()> {
        let net = Arc::new(HttpClient::new(&self.ctx.params.net)?);
        let cdn = Arc::new(CdnPrioritizer::new(self.ctx.params.cdn.clone()));

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let position = self.observer.latest().position;
            let Some(period) = self.ctx.manifest.period_at(position).cloned() else {
                // Past the last period: the content is over.
                self.events.publish(PlayerEvent::EndOfStream);
                return Ok(());
            };

            info!(period = %period.id, position, "starting period streams");
            let mut stacks = self.build_stacks(&period, &net, &cdn);
            let mut bus_rx = self.events.subscribe();
            let period_cancel = cancel.child_token();

            let mut tasks = JoinSet::new();
            for stack in &stacks {
                let stream = PeriodStream::new(PeriodStreamContext {
                    manifest: self.ctx.manifest.clone(),
                    period: period.id,
                    kind: stack.kind,
                    sink: stack.queue.clone(),
                    fetcher: stack.fetcher.clone(),
                    parser: self.ctx.parser.clone(),
                    abr: stack.abr.clone(),
                    observations: self.observer.subscribe(),
                    wanted_buffer_ahead: self.wanted_buffer_ahead.clone(),
                    track_choice: stack.track_choice.clone(),
                    events: self.events.clone(),
                    options: self.ctx.params.stream.clone(),
                });
                let task_cancel = period_cancel.clone();
                tasks.spawn(async move { stream.run(task_cancel).await });
            }

            let outcome = self
                .supervise_period(&period, &mut stacks, &mut tasks, &mut bus_rx, cancel)
                .await;
            period_cancel.cancel();
            while tasks.join_next().await.is_some() {}

            match outcome? {
                PeriodOutcome::Reload | PeriodOutcome::NextPeriod => {
                    self.events.publish(PlayerEvent::ResumeStream);
                }
                PeriodOutcome::Stopped => return Ok(()),
                PeriodOutcome::Ended => {
                    self.events.publish(PlayerEvent::EndOfStream);
                    return Ok(());
                }
            }
        }
    }

    async fn supervise_period(
        &self,
        period: &Period,
        stacks: &mut [KindStack],
        tasks: &mut JoinSet<aulos_stream::StreamResult<()>>,
        bus_rx: &mut tokio::sync::broadcast::Receiver<Event>,
        cancel: &CancellationToken,
    ) -> AulosResult<PeriodOutcome> {
        let mut obs_rx = self.observer.subscribe();
        let mut complete: HashSet<TrackKind> = HashSet::new();
        let period_end = period.end.or(self.ctx.manifest.duration());

        loop {
            tokio::select! {
                () = cancel.cancelled() => return Ok(PeriodOutcome::Stopped),

                joined = tasks.join_next() => {
                    match joined {
                        Some(Ok(Ok(()))) => {
                            // A period stream finished: either a reload was
                            // requested or its track wound down. The join
                            // can beat the event delivery, so check before
                            // declaring the session over.
                            if tasks.is_empty() {
                                while let Ok(event) = bus_rx.try_recv() {
                                    if matches!(
                                        event,
                                        Event::Stream(StreamEvent::NeedsMediaSourceReload { .. })
                                    ) {
                                        return Ok(PeriodOutcome::Reload);
                                    }
                                }
                                return Ok(PeriodOutcome::Stopped);
                            }
                        }
                        Some(Ok(Err(error))) => return Err(error.into()),
                        Some(Err(join_error)) => {
                            return Err(AulosError::Stream(
                                aulos_stream::StreamError::Parse(format!(
                                    "stream task panicked: {join_error}"
                                )),
                            ));
                        }
                        None => return Ok(PeriodOutcome::Stopped),
                    }
                }

                event = bus_rx.recv() => {
                    match event {
                        Ok(Event::Stream(StreamEvent::NeedsMediaSourceReload { .. })) => {
                            return Ok(PeriodOutcome::Reload);
                        }
                        Ok(Event::Stream(StreamEvent::StreamComplete { kind })) => {
                            complete.insert(kind);
                            if complete.len() == stacks.len() {
                                for stack in stacks.iter() {
                                    stack
                                        .queue
                                        .end_of_stream()
                                        .await
                                        .map_err(aulos_stream::StreamError::from)?;
                                }
                                return Ok(PeriodOutcome::Ended);
                            }
                        }
                        Ok(_) => {}
                        Err(_) => {}
                    }
                }

                changed = obs_rx.changed() => {
                    if changed.is_err() {
                        return Ok(PeriodOutcome::Stopped);
                    }
                    let observation = obs_rx.borrow_and_update().clone();

                    // Feed playback state into every ABR estimator and
                    // surface estimate changes.
                    let signal = PlaybackSignal {
                        position: observation.position,
                        buffer_gap: observation.buffer_gap,
                        speed: if observation.playback_rate > 0.0 {
                            observation.playback_rate
                        } else {
                            1.0
                        },
                    };
                    for stack in stacks.iter_mut() {
                        stack.abr.on_playback(signal);
                        let estimate = stack.abr.current_decision().bitrate_estimate;
                        if estimate != stack.last_estimate {
                            stack.last_estimate = estimate;
                            self.events.publish(PlayerEvent::BitrateEstimationChange {
                                bitrate: estimate,
                            });
                        }
                    }

                    // Period boundary crossing rebuilds the streams.
                    if let Some(end) = period_end {
                        if observation.position >= end && self.ctx.manifest.period_at(observation.position).is_some() {
                            return Ok(PeriodOutcome::NextPeriod);
                        }
                    }
                }
            }
        }
    }

    fn build_stacks(
        &self,
        period: &Period,
        net: &Arc<HttpClient>,
        cdn: &Arc<CdnPrioritizer>,
    ) -> Vec<KindStack> {
        self.ctx
            .sinks
            .iter()
            .map(|(kind, sink)| {
                let adaptation = self
                    .ctx
                    .manifest
                    .adaptations_of(period.id, *kind)
                    .first()
                    .map(|a| a.id);

                let ladder: Vec<RepresentationInfo> = adaptation
                    .map(|id| {
                        self.ctx
                            .manifest
                            .playable_representations_of(id)
                            .iter()
                            .map(|r| RepresentationInfo {
                                id: r.id,
                                bitrate: r.bitrate,
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                let abr = Arc::new(AbrEstimator::new(ladder, self.ctx.params.abr.clone()));

                let metrics_abr = abr.clone();
                let fetcher = Arc::new(
                    SegmentFetcher::new(
                        net.clone(),
                        cdn.clone(),
                        BackoffPolicy::from_options(&self.ctx.params.net),
                        self.ctx.params.fetch.clone(),
                    )
                    .with_metrics(Arc::new(move |sample: MetricsSample| {
                        metrics_abr.add_bandwidth_sample(ThroughputSample {
                            bytes: sample.size,
                            duration: sample.duration,
                            at: Instant::now(),
                            source: ThroughputSampleSource::Network,
                        });
                        metrics_abr.add_score_sample(
                            sample.representation,
                            sample.segment_duration,
                            sample.duration.as_secs_f64(),
                        );
                    })),
                );

                KindStack {
                    kind: *kind,
                    abr,
                    fetcher,
                    queue: Arc::new(SinkQueue::new(
                        sink.clone(),
                        self.ctx.params.queue.clone(),
                    )),
                    track_choice: SharedReference::new(adaptation),
                    last_estimate: None,
                }
            })
            .collect()
    }
}

enum PeriodOutcome {
    /// A media-source reload was requested; rebuild everything.
    Reload,
    /// The playhead crossed into the next period.
    NextPeriod,
    /// Every track finished buffering the whole content.
    Ended,
    /// Cancelled or wound down.
    Stopped,
}
