use std::sync::Arc;

use aulos_abr::{AbrEstimator, RequestProgress};
use aulos_clock::Observation;
use aulos_events::{EventBus, StreamEvent};
use aulos_fetch::{ContainerKind, FetchContext, RequestEvent, SegmentFetcher};
use aulos_media::{
    AdaptationId, Manifest, PeriodId, Representation, SegmentInfo, SharedReference, TrackKind,
};
use aulos_net::cmcd::{CmcdObjectType, CmcdPayload};
use aulos_ranges::{CONTIGUOUS_EPSILON, TimeRange, TimeRanges};
use aulos_sink::{AppendParams, SinkQueue};
use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    ParseContext, ParsedSegment, SegmentParser, StreamOptions, StreamResult, priority_for_distance,
};

/// Everything one representation stream needs, owned per instance.
#[derive(Clone)]
pub struct RepresentationStreamContext {
    pub manifest: Arc<Manifest>,
    pub period: PeriodId,
    pub adaptation: AdaptationId,
    pub kind: TrackKind,
    pub representation: Representation,
    pub sink: Arc<SinkQueue>,
    pub fetcher: Arc<SegmentFetcher>,
    pub parser: Arc<dyn SegmentParser>,
    pub abr: Arc<AbrEstimator>,
    pub observations: watch::Receiver<Observation>,
    pub wanted_buffer_ahead: SharedReference<f64>,
    pub events: EventBus,
    pub options: StreamOptions,
}

/// Downloads and appends one representation's segments.
///
/// Continuously derives the wanted range from the clock, subtracts what the
/// sink already holds, and fills the first hole, init segment first.
/// Segments are fetched strictly in presentation order, one at a time, so
/// per-sink append order follows presentation order by construction.
pub struct RepresentationStream {
    ctx: RepresentationStreamContext,
    /// Emitted `StreamComplete` already.
    complete_emitted: bool,
    /// Emitted `NeedsManifestRefresh` for the current starvation already.
    refresh_requested: bool,
    init_timescale: Option<u32>,
}

impl RepresentationStream {
    #[must_use]
    pub fn new(ctx: RepresentationStreamContext) -> Self {
        Self {
            ctx,
            complete_emitted: false,
            refresh_requested: false,
            init_timescale: None,
        }
    }

    /// Run until cancelled or a terminal error.
    ///
    /// Idles (without returning) once the period is fully buffered, so a
    /// backwards seek can resume filling.
    pub async fn run(mut self, cancel: CancellationToken) -> StreamResult<()> {
        self.ctx.events.publish(StreamEvent::RepresentationChange {
            period: self.ctx.period,
            adaptation: self.ctx.adaptation,
            representation: self.ctx.representation.id,
        });

        let mut obs_rx = self.ctx.observations.clone();
        let mut ahead_rx = self.ctx.wanted_buffer_ahead.subscribe();

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let observation = obs_rx.borrow_and_update().clone();
            match self.next_needed_segment(&observation) {
                NextAction::Fetch(segment) => {
                    let distance = segment.start - observation.position;
                    let priority =
                        priority_for_distance(distance, &self.ctx.options.priority_steps);
                    self.fetch_and_append(&segment, priority, &observation, &cancel, &mut obs_rx)
                        .await?;
                }
                NextAction::FetchInit(segment) => {
                    self.fetch_and_append(&segment, 0, &observation, &cancel, &mut obs_rx)
                        .await?;
                }
                NextAction::Starved => {
                    // A hole with no known segments: the index is stale.
                    if !self.refresh_requested {
                        self.ctx.events.publish(StreamEvent::NeedsManifestRefresh);
                        self.refresh_requested = true;
                    }
                    self.wait_for_change(&cancel, &mut obs_rx, &mut ahead_rx).await;
                }
                NextAction::Satisfied { reached_end } => {
                    if reached_end && !self.complete_emitted {
                        debug!(
                            representation = %self.ctx.representation.id,
                            "period fully buffered"
                        );
                        self.ctx
                            .events
                            .publish(StreamEvent::StreamComplete { kind: self.ctx.kind });
                        self.complete_emitted = true;
                    }
                    self.wait_for_change(&cancel, &mut obs_rx, &mut ahead_rx).await;
                }
            }
        }
    }

    async fn wait_for_change(
        &self,
        cancel: &CancellationToken,
        obs_rx: &mut watch::Receiver<Observation>,
        ahead_rx: &mut watch::Receiver<f64>,
    ) {
        tokio::select! {
            () = cancel.cancelled() => {}
            _ = obs_rx.changed() => {}
            _ = ahead_rx.changed() => {}
        }
    }

    /// Decide what to do for the current observation.
    fn next_needed_segment(&mut self, observation: &Observation) -> NextAction {
        let index = &self.ctx.representation.index;
        let (period_start, period_end) = self.period_bounds();

        let position = observation.position.max(period_start);
        let ahead = self.ctx.wanted_buffer_ahead.get().max(0.0);
        let wanted_end = (position + ahead).min(period_end);
        if wanted_end <= position {
            return NextAction::Satisfied { reached_end: false };
        }

        let mut holes = TimeRanges::new();
        holes.insert(TimeRange::new(position, wanted_end));
        holes.exclude_all(&self.ctx.sink.buffered());

        let hole = holes
            .as_slice()
            .iter()
            .find(|h| h.duration() > CONTIGUOUS_EPSILON)
            .copied();

        let Some(hole) = hole else {
            let reached_end =
                period_end.is_finite() && wanted_end >= period_end - CONTIGUOUS_EPSILON && index.is_final();
            return NextAction::Satisfied { reached_end };
        };

        // Init segment comes first, once per representation per sink.
        if !self.ctx.sink.has_init(self.ctx.representation.id) {
            if let Some(init) = index.init_segment() {
                return NextAction::FetchInit(init);
            }
        }

        match index.segments_in(hole.start, hole.end).into_iter().next() {
            Some(segment) => {
                self.refresh_requested = false;
                NextAction::Fetch(segment)
            }
            None if index.is_final() => {
                // Hole the index can never fill (padding at period edges).
                NextAction::Satisfied {
                    reached_end: wanted_end >= period_end - CONTIGUOUS_EPSILON,
                }
            }
            None => NextAction::Starved,
        }
    }

    fn period_bounds(&self) -> (f64, f64) {
        let period = self.ctx.manifest.period(self.ctx.period);
        let start = period.map_or(0.0, |p| p.start);
        let end = period
            .and_then(|p| p.end)
            .or_else(|| self.ctx.manifest.duration())
            .unwrap_or(f64::INFINITY);
        (start, end)
    }

    /// Drive one segment request to completion, parsing and appending every
    /// chunk. Cancels the request when the playhead jumps far past it.
    async fn fetch_and_append(
        &mut self,
        segment: &SegmentInfo,
        priority: i32,
        observation: &Observation,
        cancel: &CancellationToken,
        obs_rx: &mut watch::Receiver<Observation>,
    ) -> StreamResult<()> {
        let representation_id = self.ctx.representation.id;
        let context = FetchContext {
            representation: representation_id,
            segment: segment.clone(),
            container: ContainerKind::from_mime(&self.ctx.representation.mime),
            segment_duration: segment.duration,
            cmcd: Some(self.cmcd_payload(segment, observation)),
        };

        let request_cancel = cancel.child_token();
        let mut events = self
            .ctx
            .fetcher
            .create_request(context, priority, request_cancel.clone());

        let parse_context = ParseContext {
            representation: representation_id,
            segment: segment.clone(),
        };
        let mut request_id = None;
        let mut playhead = observation.position;

        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => {
                    request_cancel.cancel();
                    return Ok(());
                }
                changed = obs_rx.changed() => {
                    if changed.is_err() {
                        request_cancel.cancel();
                        return Ok(());
                    }
                    let observation = obs_rx.borrow_and_update().clone();
                    playhead = observation.position;
                    if self.jumped_past(segment, &observation) {
                        trace!(
                            segment = segment.id,
                            position = observation.position,
                            "position jumped past in-flight segment, cancelling"
                        );
                        request_cancel.cancel();
                        if let Some(id) = request_id {
                            self.ctx.abr.note_request_end(id);
                        }
                        return Ok(());
                    }
                    continue;
                }
                event = events.next() => event,
            };

            match event {
                Some(Ok(RequestEvent::Begin { request_id: id })) => {
                    self.ctx.abr.note_request_begin(id);
                    request_id = Some(id);
                }
                Some(Ok(RequestEvent::Progress {
                    loaded,
                    total,
                    elapsed,
                })) => {
                    if let Some(id) = request_id {
                        self.ctx.abr.note_request_progress(
                            id,
                            RequestProgress {
                                loaded,
                                total,
                                elapsed,
                                segment_duration: segment.duration,
                            },
                        );
                    }
                }
                Some(Ok(RequestEvent::Retry { error })) => {
                    self.ctx.events.publish(StreamEvent::Warning {
                        message: format!("segment request retrying: {error}"),
                    });
                }
                Some(Ok(RequestEvent::Chunk { bytes })) => {
                    self.append_chunk(bytes, segment, &parse_context, playhead).await?;
                }
                Some(Ok(RequestEvent::ChunkComplete)) => {}
                Some(Ok(RequestEvent::Ended)) => {
                    if let Some(id) = request_id {
                        self.ctx.abr.note_request_end(id);
                    }
                    self.ctx.events.publish(StreamEvent::AddedSegment {
                        representation: representation_id,
                        segment_id: segment.id,
                        buffered: self.ctx.sink.buffered(),
                    });
                    return Ok(());
                }
                Some(Err(error)) => {
                    if let Some(id) = request_id {
                        self.ctx.abr.note_request_end(id);
                    }
                    return Err(error.into());
                }
                None => return Ok(()),
            }
        }
    }

    async fn append_chunk(
        &mut self,
        bytes: bytes::Bytes,
        segment: &SegmentInfo,
        parse_context: &ParseContext,
        playhead: f64,
    ) -> StreamResult<()> {
        let parsed = if segment.is_init {
            self.ctx.parser.parse_init(bytes, parse_context)?
        } else {
            self.ctx
                .parser
                .parse_media(bytes, parse_context, self.init_timescale)?
        };

        match parsed {
            ParsedSegment::Init {
                initialization_data,
                init_timescale,
                protection_update,
            } => {
                if let Some(data) = protection_update {
                    self.ctx
                        .events
                        .publish(StreamEvent::EncryptionDataEncountered { data });
                }
                self.init_timescale = init_timescale;
                self.ctx
                    .sink
                    .append_init(
                        self.ctx.representation.id,
                        initialization_data,
                        AppendParams {
                            codec: self.ctx.representation.codec.clone(),
                            timestamp_offset: 0.0,
                            append_window: (None, None),
                            time_range: None,
                        },
                    )
                    .await?;
            }
            ParsedSegment::Media {
                data,
                time_range,
                time_offset,
                append_window,
                protection_update,
            } => {
                if let Some(data) = protection_update {
                    self.ctx
                        .events
                        .publish(StreamEvent::EncryptionDataEncountered { data });
                }
                self.ctx
                    .sink
                    .append_media(
                        data,
                        AppendParams {
                            codec: self.ctx.representation.codec.clone(),
                            timestamp_offset: time_offset,
                            append_window,
                            time_range,
                        },
                        playhead,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// The playhead moved far enough that this in-flight segment is outside
    /// the wanted window on either side.
    fn jumped_past(&self, segment: &SegmentInfo, observation: &Observation) -> bool {
        if segment.is_init {
            return false;
        }
        let margin = self.ctx.options.jump_cancel_margin;
        observation.position > segment.end() + margin
            || segment.start
                > observation.position + self.ctx.wanted_buffer_ahead.get() + margin
    }

    fn cmcd_payload(&self, segment: &SegmentInfo, observation: &Observation) -> CmcdPayload {
        let decision = self.ctx.abr.current_decision();
        CmcdPayload {
            bitrate_kbps: Some(self.ctx.representation.bitrate / 1000),
            buffer_length_ms: observation
                .buffer_gap
                .is_finite()
                .then(|| (observation.buffer_gap * 1000.0) as u64),
            measured_throughput_kbps: decision.bitrate_estimate.map(|b| b / 1000),
            object_type: Some(if segment.is_init {
                CmcdObjectType::InitSegment
            } else {
                match self.ctx.kind {
                    TrackKind::Audio => CmcdObjectType::AudioOnly,
                    TrackKind::Video => CmcdObjectType::VideoOnly,
                    TrackKind::Text => CmcdObjectType::CaptionOrSubtitle,
                }
            }),
        }
    }
}

enum NextAction {
    /// Fetch this media segment next.
    Fetch(SegmentInfo),
    /// Fetch the init segment before any media.
    FetchInit(SegmentInfo),
    /// Wanted range covered; `reached_end` when the whole period is.
    Satisfied { reached_end: bool },
    /// A hole exists but the index has nothing for it.
    Starved,
}
