use std::{sync::Arc, time::Duration};

use aulos::{
    AulosParams, Event, MediaElement, PlayerEvent, SegmentSink, Session, SessionContext, StartAt,
    StreamEvent,
};
use aulos_clock::ClockOptions;
use aulos_media::TrackKind;
use aulos_sink::testing::MemorySink;
use aulos_stream::PassthroughParser;
use aulos_test_utils::{
    FakeMediaElement, TestHttpServer, isobmff_media_segment, single_period_manifest,
};
use axum::{Router, routing::get};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn session_buffers_content_and_reaches_end_of_stream() {
    let segment = isobmff_media_segment(1, 64);
    let server = TestHttpServer::new(Router::new().route(
        "/:rep/:seg",
        get(move || {
            let segment = segment.clone();
            async move { segment.to_vec() }
        }),
    ))
    .await;

    let manifest = Arc::new(single_period_manifest(
        server.base_url(),
        &[300_000, 800_000],
        20.0,
    ));

    // The host element pretends its own buffer is healthy so playback is
    // immediately "playable"; the engine's sink starts empty regardless.
    let media = Arc::new(FakeMediaElement::new());
    media.set_duration(20.0);
    media.set_ready_state(4);
    media.set_buffered_range(0.0, 20.0);

    let sink = Arc::new(MemorySink::new());

    let params = AulosParams::new()
        .with_start_at(StartAt::Percentage(50.0))
        .with_wanted_buffer_ahead(25.0);
    let params = AulosParams {
        clock: ClockOptions {
            interval_media_source: Duration::from_millis(10),
            ..ClockOptions::default()
        },
        ..params
    };

    let session = Session::new(SessionContext {
        manifest,
        media: media.clone(),
        sinks: vec![(TrackKind::Video, sink.clone())],
        parser: Arc::new(PassthroughParser),
        params,
    });
    let mut events = session.events().subscribe();

    // Acknowledge the initial seek once it lands.
    {
        let media = media.clone();
        tokio::spawn(async move {
            loop {
                if media.seeking() {
                    media.finish_seek();
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });
    }

    let cancel = CancellationToken::new();
    tokio::time::timeout(Duration::from_secs(10), session.run(cancel))
        .await
        .expect("session must reach end of stream")
        .expect("session must not fail");

    // Initial seek landed at 50% of 20 s.
    assert!((media.position() - 10.0).abs() < 1e-9);

    // The engine buffered the wanted range through its own sink.
    assert!(sink.buffered().contains(10.0));
    assert!(sink.buffered().left_size(10.0) >= 10.0 - 1e-6);
    assert!(sink.ended(), "end_of_stream must reach the sink");

    let mut ready = false;
    let mut complete = false;
    let mut ended = false;
    while let Ok(event) = events.try_recv() {
        match event {
            Event::Stream(StreamEvent::PeriodStreamReady { kind, .. }) => {
                assert_eq!(kind, TrackKind::Video);
                ready = true;
            }
            Event::Stream(StreamEvent::StreamComplete { .. }) => complete = true,
            Event::Player(PlayerEvent::EndOfStream) => ended = true,
            _ => {}
        }
    }
    assert!(ready);
    assert!(complete);
    assert!(ended);
}
