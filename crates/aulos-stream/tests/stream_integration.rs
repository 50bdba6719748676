use std::{sync::Arc, time::Duration};

use axum::{Router, routing::get};
use aulos_abr::{AbrEstimator, AbrOptions, RepresentationInfo};
use aulos_clock::Observation;
use aulos_events::{Event, EventBus, StreamEvent};
use aulos_fetch::{FetchOptions, SegmentFetcher};
use aulos_media::{
    Adaptation, AdaptationId, Manifest, Period, PeriodId, Representation, RepresentationId,
    SegmentInfo, SharedReference, TimelineIndex, TrackKind,
};
use aulos_net::{BackoffPolicy, CdnOptions, CdnPrioritizer, HttpClient, NetOptions};
use aulos_sink::{QueueOptions, SegmentSink, SinkError, SinkQueue, testing::MemorySink};
use aulos_stream::{
    AdaptationStream, AdaptationStreamContext, PassthroughParser, PeriodStream,
    PeriodStreamContext, RepresentationStream, RepresentationStreamContext, StreamOptions,
};
use aulos_test_utils::{TestHttpServer, isobmff_init_segment, isobmff_media_segment};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

struct Rig {
    manifest: Arc<Manifest>,
    sink: Arc<MemorySink>,
    queue: Arc<SinkQueue>,
    fetcher: Arc<SegmentFetcher>,
    abr: Arc<AbrEstimator>,
    obs_tx: watch::Sender<Observation>,
    obs_rx: watch::Receiver<Observation>,
    events: EventBus,
    _server: TestHttpServer,
}

fn representation(id: u32, bitrate: u64, codec: &str, base: &Url, with_init: bool) -> Representation {
    let rep_base = base.join(&format!("rep-{id}/")).unwrap();
    let init = with_init.then(|| SegmentInfo {
        id: u64::MAX,
        start: 0.0,
        duration: 0.0,
        is_init: true,
        time_offset: 0.0,
        byte_range: None,
        urls: vec![rep_base.join("init.mp4").unwrap()],
    });
    Representation {
        id: RepresentationId(id),
        bitrate,
        codec: codec.to_string(),
        mime: "video/mp4".to_string(),
        index: Arc::new(TimelineIndex::uniform(&rep_base, 0.0, 4.0, 5, init)),
    }
}

async fn rig(codecs: &[(u64, &str)], with_init: bool) -> Rig {
    let segment = isobmff_media_segment(1, 64);
    let init = isobmff_init_segment();
    let router = Router::new().route(
        "/:rep/:seg",
        get(move |axum::extract::Path((_rep, seg)): axum::extract::Path<(String, String)>| {
            let init = init.clone();
            let segment = segment.clone();
            async move {
                if seg == "init.mp4" {
                    init.to_vec()
                } else {
                    segment.to_vec()
                }
            }
        }),
    );
    let server = TestHttpServer::new(router).await;
    let base = server.base_url().clone();

    let representations: Vec<Representation> = codecs
        .iter()
        .enumerate()
        .map(|(i, &(bitrate, codec))| representation(i as u32, bitrate, codec, &base, with_init))
        .collect();
    let ladder: Vec<RepresentationInfo> = representations
        .iter()
        .map(|r| RepresentationInfo {
            id: r.id,
            bitrate: r.bitrate,
        })
        .collect();

    let adaptation = Adaptation {
        id: AdaptationId(0),
        kind: TrackKind::Video,
        representations: representations.iter().map(|r| r.id).collect(),
        language: None,
    };
    let period = Period {
        id: PeriodId(0),
        start: 0.0,
        end: Some(20.0),
        adaptations: vec![AdaptationId(0)],
    };
    let manifest = Arc::new(Manifest::new(
        vec![period],
        vec![adaptation],
        representations,
        Some(20.0),
    ));

    let sink = Arc::new(MemorySink::new());
    let queue = Arc::new(SinkQueue::new(sink.clone(), QueueOptions::default()));
    let net = Arc::new(HttpClient::new(&NetOptions::default()).unwrap());
    let cdn = Arc::new(CdnPrioritizer::new(CdnOptions::default()));
    let backoff = BackoffPolicy {
        max_retry: Some(2),
        base: Duration::from_millis(1),
        max: Duration::from_millis(2),
    };
    let fetcher = Arc::new(SegmentFetcher::new(
        net,
        cdn,
        backoff,
        FetchOptions::default(),
    ));
    let abr = Arc::new(AbrEstimator::new(ladder, AbrOptions::default()));

    let (obs_tx, obs_rx) = watch::channel(Observation {
        ready_state: 4,
        ..Observation::initial()
    });

    Rig {
        manifest,
        sink,
        queue,
        fetcher,
        abr,
        obs_tx,
        obs_rx,
        events: EventBus::new(64),
        _server: server,
    }
}

fn rep_ctx(rig: &Rig, rep: u32) -> RepresentationStreamContext {
    RepresentationStreamContext {
        manifest: rig.manifest.clone(),
        period: PeriodId(0),
        adaptation: AdaptationId(0),
        kind: TrackKind::Video,
        representation: rig.manifest.representation(RepresentationId(rep)).unwrap().clone(),
        sink: rig.queue.clone(),
        fetcher: rig.fetcher.clone(),
        parser: Arc::new(PassthroughParser),
        abr: rig.abr.clone(),
        observations: rig.obs_rx.clone(),
        wanted_buffer_ahead: SharedReference::new(25.0),
        events: rig.events.clone(),
        options: StreamOptions::default(),
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for: {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn representation_stream_fills_period_and_completes() {
    let rig = rig(&[(300_000, "avc1.4d401e")], false).await;
    let mut events = rig.events.subscribe();
    let cancel = CancellationToken::new();

    let stream = RepresentationStream::new(rep_ctx(&rig, 0));
    let task = tokio::spawn(stream.run(cancel.clone()));

    let mut added = 0;
    wait_until(
        || {
            while let Ok(event) = events.try_recv() {
                match event {
                    Event::Stream(StreamEvent::AddedSegment { .. }) => added += 1,
                    Event::Stream(StreamEvent::StreamComplete { kind }) => {
                        assert_eq!(kind, TrackKind::Video);
                        return true;
                    }
                    _ => {}
                }
            }
            false
        },
        "stream-complete after the whole period buffered",
    )
    .await;

    assert_eq!(added, 5, "one added-segment event per segment");
    assert_eq!(rig.sink.appends().len(), 5);
    assert!(rig.sink.buffered().left_size(0.0) >= 20.0 - 1e-6);
    // No partial commits: appended bytes equal the sum of segment sizes.
    assert_eq!(
        rig.sink.appended_bytes(),
        5 * isobmff_media_segment(1, 64).len() as u64
    );

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn init_segment_is_appended_before_media() {
    let rig = rig(&[(300_000, "avc1.4d401e")], true).await;
    let cancel = CancellationToken::new();

    let stream = RepresentationStream::new(rep_ctx(&rig, 0));
    let task = tokio::spawn(stream.run(cancel.clone()));

    let sink = rig.sink.clone();
    wait_until(|| sink.appends().len() >= 2, "init plus first media append").await;

    let appends = rig.sink.appends();
    assert!(
        appends[0].params.time_range.is_none(),
        "first append must be the init segment"
    );
    assert!(appends[1].params.time_range.is_some());
    assert!(rig.queue.has_init(RepresentationId(0)));

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn moving_playhead_extends_the_buffer() {
    let rig = rig(&[(300_000, "avc1.4d401e")], false).await;
    let cancel = CancellationToken::new();

    let mut ctx = rep_ctx(&rig, 0);
    ctx.wanted_buffer_ahead = SharedReference::new(6.0);
    let task = tokio::spawn(RepresentationStream::new(ctx).run(cancel.clone()));

    // Wanted [0, 6): segments 0 and 1.
    let sink = rig.sink.clone();
    wait_until(|| sink.appends().len() == 2, "first two segments").await;

    rig.obs_tx.send_modify(|obs| obs.position = 6.0);
    // Wanted [6, 12): segment 2 (and 3 once 12 is wanted).
    let sink = rig.sink.clone();
    wait_until(|| sink.appends().len() >= 3, "segment after playhead move").await;

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn codec_switch_requests_reload_and_never_appends() {
    let rig = rig(&[(300_000, "avc1.4d401e"), (5_000_000, "hvc1.1.6.L93.B0")], false).await;
    let mut events = rig.events.subscribe();
    let cancel = CancellationToken::new();

    let ctx = AdaptationStreamContext {
        manifest: rig.manifest.clone(),
        period: PeriodId(0),
        adaptation: AdaptationId(0),
        kind: TrackKind::Video,
        sink: rig.queue.clone(),
        fetcher: rig.fetcher.clone(),
        parser: Arc::new(PassthroughParser),
        abr: rig.abr.clone(),
        observations: rig.obs_rx.clone(),
        wanted_buffer_ahead: SharedReference::new(25.0),
        events: rig.events.clone(),
        options: StreamOptions::default(),
    };
    let stream = AdaptationStream::new(ctx);
    let task = tokio::spawn(async move { stream.run(cancel.clone()).await });

    let sink = rig.sink.clone();
    wait_until(|| !sink.appends().is_empty(), "initial representation appends").await;

    // Force a switch to the HEVC representation.
    rig.abr.set_manual_bitrate(5_000_000);

    // The adaptation stream must stop with a reload request.
    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("adaptation stream must stop after codec switch")
        .unwrap();
    result.unwrap();

    let mut saw_reload = false;
    while let Ok(event) = events.try_recv() {
        if let Event::Stream(StreamEvent::NeedsMediaSourceReload { .. }) = event {
            saw_reload = true;
        }
    }
    assert!(saw_reload);

    for append in rig.sink.appends() {
        assert!(
            append.params.codec.starts_with("avc1"),
            "HEVC data must never reach the AVC sink"
        );
    }
}

fn period_ctx(rig: &Rig, kind: TrackKind) -> PeriodStreamContext {
    PeriodStreamContext {
        manifest: rig.manifest.clone(),
        period: PeriodId(0),
        kind,
        sink: rig.queue.clone(),
        fetcher: rig.fetcher.clone(),
        parser: Arc::new(PassthroughParser),
        abr: rig.abr.clone(),
        observations: rig.obs_rx.clone(),
        wanted_buffer_ahead: SharedReference::new(25.0),
        track_choice: SharedReference::new(Some(AdaptationId(0))),
        events: rig.events.clone(),
        options: StreamOptions::default(),
    }
}

#[tokio::test]
async fn text_track_sink_failure_degrades_to_warning() {
    let rig = rig(&[(300_000, "wvtt")], false).await;
    rig.sink.push_error(SinkError::CodecRejected("wvtt".into()));

    let mut events = rig.events.subscribe();
    let cancel = CancellationToken::new();
    let stream = PeriodStream::new(period_ctx(&rig, TrackKind::Text));
    let task = tokio::spawn(async move { stream.run(cancel.clone()).await });

    wait_until(
        || {
            while let Ok(event) = events.try_recv() {
                if let Event::Stream(StreamEvent::Warning { message }) = event {
                    if message.contains("disabled") {
                        return true;
                    }
                }
            }
            false
        },
        "demotion warning",
    )
    .await;

    // The period stream keeps running as an empty stream.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!task.is_finished(), "text failure must not end the period");
    task.abort();
}

#[tokio::test]
async fn native_sink_failure_requests_reload() {
    let rig = rig(&[(300_000, "avc1.4d401e")], false).await;
    rig.sink.push_error(SinkError::Closed);

    let mut events = rig.events.subscribe();
    let cancel = CancellationToken::new();
    let stream = PeriodStream::new(period_ctx(&rig, TrackKind::Video));
    let task = tokio::spawn(async move { stream.run(cancel.clone()).await });

    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("period stream must stop on fatal native sink error")
        .unwrap();
    result.unwrap();

    let mut saw_reload = false;
    while let Ok(event) = events.try_recv() {
        if let Event::Stream(StreamEvent::NeedsMediaSourceReload { .. }) = event {
            saw_reload = true;
        }
    }
    assert!(saw_reload);
}

#[tokio::test]
async fn decipherability_loss_flushes_and_refilters() {
    let rig = rig(&[(300_000, "avc1.4d401e"), (800_000, "avc1.64001f")], false).await;
    let mut events = rig.events.subscribe();
    let cancel = CancellationToken::new();

    let stream = PeriodStream::new(period_ctx(&rig, TrackKind::Video));
    let task = tokio::spawn(async move { stream.run(cancel.clone()).await });

    let sink = rig.sink.clone();
    wait_until(|| !sink.appends().is_empty(), "initial appends").await;

    // The DRM layer reports the high representation undecipherable.
    rig.manifest
        .update_decipherability(&[(RepresentationId(1), false)]);

    wait_until(
        || {
            while let Ok(event) = events.try_recv() {
                if matches!(
                    event,
                    Event::Stream(StreamEvent::NeedsDecipherabilityFlush { .. })
                ) {
                    return true;
                }
            }
            false
        },
        "decipherability flush event",
    )
    .await;

    // The stream restarts on the filtered ladder and keeps filling.
    let before = rig.sink.appends().len();
    let sink = rig.sink.clone();
    wait_until(
        || sink.appends().len() > before,
        "appends resume after the flush",
    )
    .await;

    assert!(!task.is_finished(), "losing one representation is not fatal");
    task.abort();
}

#[tokio::test]
async fn buffer_behind_is_garbage_collected() {
    let rig = rig(&[(300_000, "avc1.4d401e")], false).await;
    let cancel = CancellationToken::new();

    let mut ctx = period_ctx(&rig, TrackKind::Video);
    ctx.options.max_buffer_behind = Some(5.0);
    let stream = PeriodStream::new(ctx);
    let task = tokio::spawn(async move { stream.run(cancel.clone()).await });

    let sink = rig.sink.clone();
    wait_until(
        || sink.buffered().left_size(0.0) >= 20.0 - 1e-6,
        "whole period buffered",
    )
    .await;

    rig.obs_tx.send_modify(|obs| obs.position = 15.0);

    let sink = rig.sink.clone();
    wait_until(
        || !sink.buffered().contains(5.0),
        "history behind the playhead collected",
    )
    .await;
    assert!(rig.sink.buffered().contains(12.0));

    task.abort();
}
