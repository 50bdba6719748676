//! End-to-end demo against an in-process HTTP server and an in-memory sink.
//!
//! ```sh
//! cargo run --example memory_playback
//! ```

use std::{sync::Arc, time::Duration};

use aulos::{AulosParams, Event, MediaElement, SegmentSink, Session, SessionContext, StartAt};
use aulos_media::TrackKind;
use aulos_sink::testing::MemorySink;
use aulos_stream::PassthroughParser;
use aulos_test_utils::{
    FakeMediaElement, TestHttpServer, isobmff_media_segment, single_period_manifest,
};
use axum::{Router, routing::get};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,aulos=debug".into()),
        )
        .init();

    let segment = isobmff_media_segment(1, 4096);
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
        &[300_000, 800_000, 2_000_000],
        40.0,
    ));

    let media = Arc::new(FakeMediaElement::new());
    media.set_duration(40.0);
    media.set_ready_state(4);
    media.set_buffered_range(0.0, 40.0);

    let sink = Arc::new(MemorySink::new());
    let session = Session::new(SessionContext {
        manifest,
        media: media.clone(),
        sinks: vec![(TrackKind::Video, sink.clone())],
        parser: Arc::new(PassthroughParser),
        params: AulosParams::new()
            .with_start_at(StartAt::FromFirstPosition(0.0))
            .with_wanted_buffer_ahead(60.0),
    });

    let mut events = session.events().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::Player(e) => println!("player: {e:?}"),
                Event::Stream(e) => println!("stream: {e:?}"),
            }
        }
    });

    // Acknowledge seeks the engine performs on the fake element.
    {
        let media = media.clone();
        tokio::spawn(async move {
            loop {
                if media.seeking() {
                    media.finish_seek();
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        });
    }

    let cancel = CancellationToken::new();
    match session.run(cancel).await {
        Ok(()) => println!(
            "done: buffered {:.1}s across {} appends",
            sink.buffered().total_duration(),
            sink.appends().len()
        ),
        Err(error) => eprintln!("session failed: {error}"),
    }
}
