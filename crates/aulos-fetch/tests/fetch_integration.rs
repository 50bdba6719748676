use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use axum::{Router, extract::State, http::StatusCode, routing::get};
use aulos_fetch::{
    ContainerKind, FetchContext, FetchError, FetchOptions, RequestEvent, SegmentFetcher,
};
use aulos_media::{RepresentationId, SegmentInfo};
use aulos_net::{
    BackoffPolicy, CdnOptions, CdnPrioritizer, HttpClient, NetOptions,
};
use aulos_test_utils::{TestHttpServer, isobmff_media_segment, truncate};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use url::Url;

fn fetcher(options: FetchOptions) -> SegmentFetcher {
    let net = Arc::new(HttpClient::new(&NetOptions::default()).expect("client"));
    let cdn = Arc::new(CdnPrioritizer::new(CdnOptions::default()));
    let backoff = BackoffPolicy {
        max_retry: Some(4),
        base: Duration::from_millis(1),
        max: Duration::from_millis(2),
    };
    SegmentFetcher::new(net, cdn, backoff, options)
}

fn context(urls: Vec<Url>) -> FetchContext {
    FetchContext {
        representation: RepresentationId(0),
        segment: SegmentInfo {
            id: 1,
            start: 0.0,
            duration: 4.0,
            is_init: false,
            time_offset: 0.0,
            byte_range: None,
            urls,
        },
        container: ContainerKind::Mp4,
        segment_duration: 4.0,
        cmcd: None,
    }
}

async fn collect(
    mut stream: aulos_fetch::FetchStream,
) -> (Vec<RequestEvent>, Option<FetchError>) {
    let mut events = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => events.push(event),
            Err(error) => return (events, Some(error)),
        }
    }
    (events, None)
}

#[tokio::test]
async fn successful_request_emits_full_sequence() {
    let segment = isobmff_media_segment(1, 64);
    let body = segment.clone();
    let server = TestHttpServer::new(
        Router::new().route("/seg.m4s", get(move || async move { body.to_vec() })),
    )
    .await;

    let fetcher = fetcher(FetchOptions::default());
    let stream = fetcher.create_request(
        context(vec![server.url("/seg.m4s")]),
        0,
        CancellationToken::new(),
    );
    let (events, error) = collect(stream).await;

    assert!(error.is_none(), "unexpected error: {error:?}");
    assert!(matches!(events[0], RequestEvent::Begin { .. }));
    assert!(matches!(events[1], RequestEvent::Progress { loaded, .. } if loaded == segment.len() as u64));
    assert!(matches!(&events[2], RequestEvent::Chunk { bytes } if bytes[..] == segment[..]));
    assert!(matches!(events[3], RequestEvent::ChunkComplete));
    assert!(matches!(events[4], RequestEvent::Ended));
}

#[tokio::test]
async fn metrics_reported_on_success() {
    let segment = isobmff_media_segment(1, 64);
    let body = segment.clone();
    let server = TestHttpServer::new(
        Router::new().route("/seg.m4s", get(move || async move { body.to_vec() })),
    )
    .await;

    let samples = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = samples.clone();
    let fetcher = fetcher(FetchOptions::default()).with_metrics(Arc::new(
        move |sample: aulos_fetch::MetricsSample| sink.lock().push(sample),
    ));

    let stream = fetcher.create_request(
        context(vec![server.url("/seg.m4s")]),
        0,
        CancellationToken::new(),
    );
    let (_, error) = collect(stream).await;
    assert!(error.is_none());

    let samples = samples.lock();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].size, segment.len() as u64);
    assert_eq!(samples[0].segment_duration, 4.0);
}

#[tokio::test]
async fn cdn_failover_then_retry_budget() {
    // CDN A and CDN B both 503 on their first hit, then recover. Expected:
    // A fails -> immediate switch to B (no budget) -> B fails -> cycle
    // exhausted, one backoff retry -> A succeeds. Three network attempts,
    // two retry events.
    #[derive(Clone)]
    struct Flaky(Arc<AtomicU32>, Vec<u8>);

    async fn handler(State(Flaky(calls, body)): State<Flaky>) -> Result<Vec<u8>, StatusCode> {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(StatusCode::SERVICE_UNAVAILABLE)
        } else {
            Ok(body)
        }
    }

    let segment = isobmff_media_segment(1, 32);
    let calls_a = Arc::new(AtomicU32::new(0));
    let calls_b = Arc::new(AtomicU32::new(0));
    let server_a = TestHttpServer::new(
        Router::new()
            .route("/seg.m4s", get(handler))
            .with_state(Flaky(calls_a.clone(), segment.to_vec())),
    )
    .await;
    let server_b = TestHttpServer::new(
        Router::new()
            .route("/seg.m4s", get(handler))
            .with_state(Flaky(calls_b.clone(), segment.to_vec())),
    )
    .await;

    let url_a = server_a.url("/seg.m4s");
    let url_b = server_b.url("/seg.m4s");

    let fetcher = fetcher(FetchOptions::default());
    let stream = fetcher.create_request(
        context(vec![url_a.clone(), url_b.clone()]),
        0,
        CancellationToken::new(),
    );
    let (events, error) = collect(stream).await;

    assert!(error.is_none(), "unexpected error: {error:?}");
    let retries = events
        .iter()
        .filter(|e| matches!(e, RequestEvent::Retry { .. }))
        .count();
    assert_eq!(retries, 2);
    assert!(matches!(events.last(), Some(RequestEvent::Ended)));
    assert_eq!(calls_a.load(Ordering::SeqCst), 2);
    assert_eq!(calls_b.load(Ordering::SeqCst), 1);

    // The recovered CDN outscores the one that only failed.
    assert!(fetcher.cdn().score_of(&url_a) > fetcher.cdn().score_of(&url_b));
}

#[tokio::test]
async fn non_retryable_status_fails_fast() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let server = TestHttpServer::new(Router::new().route(
        "/seg.m4s",
        get(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                StatusCode::NOT_FOUND
            }
        }),
    ))
    .await;

    let fetcher = fetcher(FetchOptions::default());
    let stream = fetcher.create_request(
        context(vec![server.url("/seg.m4s")]),
        0,
        CancellationToken::new(),
    );
    let (events, error) = collect(stream).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(matches!(error, Some(FetchError::Net(_))));
    assert_eq!(events.len(), 1, "only Begin before the terminal error");
}

#[tokio::test]
async fn truncated_segment_is_retried() {
    #[derive(Clone)]
    struct Truncating(Arc<AtomicU32>, Vec<u8>, Vec<u8>);

    async fn handler(State(Truncating(calls, cut, full)): State<Truncating>) -> Vec<u8> {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            cut
        } else {
            full
        }
    }

    let segment = isobmff_media_segment(1, 128);
    let cut = truncate(&segment, 16);
    let calls = Arc::new(AtomicU32::new(0));
    let server = TestHttpServer::new(
        Router::new()
            .route("/seg.m4s", get(handler))
            .with_state(Truncating(calls.clone(), cut.to_vec(), segment.to_vec())),
    )
    .await;

    let fetcher = fetcher(FetchOptions {
        check_integrity: true,
        ..FetchOptions::default()
    });
    let stream = fetcher.create_request(
        context(vec![server.url("/seg.m4s")]),
        0,
        CancellationToken::new(),
    );
    let (events, error) = collect(stream).await;

    assert!(error.is_none(), "unexpected error: {error:?}");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(events.iter().any(|e| matches!(
        e,
        RequestEvent::Retry {
            error: FetchError::Integrity(_)
        }
    )));
}

#[tokio::test]
async fn chunked_mode_emits_per_pair_chunks() {
    let segment = isobmff_media_segment(3, 256);
    let body = segment.clone();
    let server = TestHttpServer::new(
        Router::new().route("/seg.m4s", get(move || async move { body.to_vec() })),
    )
    .await;

    let fetcher = fetcher(FetchOptions {
        low_latency: true,
        ..FetchOptions::default()
    });
    let stream = fetcher.create_request(
        context(vec![server.url("/seg.m4s")]),
        0,
        CancellationToken::new(),
    );
    let (events, error) = collect(stream).await;

    assert!(error.is_none(), "unexpected error: {error:?}");
    let chunks: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            RequestEvent::Chunk { bytes } => Some(bytes.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(chunks.len(), 3, "one chunk per moof+mdat pair");
    let reassembled: Vec<u8> = chunks.iter().flat_map(|b| b.to_vec()).collect();
    assert_eq!(reassembled, segment.to_vec());
}

#[tokio::test]
async fn duplicate_request_is_rejected() {
    let server = TestHttpServer::new(Router::new().route(
        "/seg.m4s",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Vec::new()
        }),
    ))
    .await;

    let fetcher = fetcher(FetchOptions::default());
    let cancel = CancellationToken::new();

    let mut first = fetcher.create_request(
        context(vec![server.url("/seg.m4s")]),
        0,
        cancel.clone(),
    );
    // Drive the first request into flight.
    let begin = first.next().await.unwrap().unwrap();
    assert!(matches!(begin, RequestEvent::Begin { .. }));

    let second = fetcher.create_request(
        context(vec![server.url("/seg.m4s")]),
        0,
        cancel.clone(),
    );
    let (_, error) = collect(second).await;
    assert!(matches!(error, Some(FetchError::DuplicateRequest)));

    // Cancelling the first frees the slot.
    cancel.cancel();
    let (_, error) = collect(first).await;
    assert!(matches!(error, Some(FetchError::Cancelled)));

    let third = fetcher.create_request(
        context(vec![server.url("/seg.m4s")]),
        0,
        CancellationToken::new(),
    );
    let mut third = third;
    let begin = third.next().await.unwrap().unwrap();
    assert!(matches!(begin, RequestEvent::Begin { .. }));
}

#[tokio::test]
async fn custom_loader_resolves_without_network() {
    use async_trait::async_trait;
    use aulos_fetch::{CustomLoaderOutcome, CustomSegmentLoader, FetchResult};
    use bytes::Bytes;

    struct AppLoader;

    #[async_trait]
    impl CustomSegmentLoader for AppLoader {
        async fn load(
            &self,
            _url: &Url,
            _context: &FetchContext,
            _cancel: &CancellationToken,
        ) -> FetchResult<CustomLoaderOutcome> {
            Ok(CustomLoaderOutcome::Resolved {
                data: Bytes::from_static(b"app-provided"),
                duration: None,
            })
        }
    }

    // No route registered: any network hit would 404 and fail the test.
    let server = TestHttpServer::new(Router::new()).await;
    let fetcher = fetcher(FetchOptions::default()).with_custom_loader(Arc::new(AppLoader));

    let stream = fetcher.create_request(
        context(vec![server.url("/seg.m4s")]),
        0,
        CancellationToken::new(),
    );
    let (events, error) = collect(stream).await;

    assert!(error.is_none(), "unexpected error: {error:?}");
    assert!(events.iter().any(
        |e| matches!(e, RequestEvent::Chunk { bytes } if &bytes[..] == b"app-provided")
    ));
}

#[tokio::test]
async fn custom_loader_fallback_uses_network() {
    use async_trait::async_trait;
    use aulos_fetch::{CustomLoaderOutcome, CustomSegmentLoader, FetchResult};

    struct DecliningLoader;

    #[async_trait]
    impl CustomSegmentLoader for DecliningLoader {
        async fn load(
            &self,
            _url: &Url,
            _context: &FetchContext,
            _cancel: &CancellationToken,
        ) -> FetchResult<CustomLoaderOutcome> {
            Ok(CustomLoaderOutcome::Fallback)
        }
    }

    let segment = isobmff_media_segment(1, 32);
    let body = segment.clone();
    let server = TestHttpServer::new(
        Router::new().route("/seg.m4s", get(move || async move { body.to_vec() })),
    )
    .await;

    let fetcher = fetcher(FetchOptions::default()).with_custom_loader(Arc::new(DecliningLoader));
    let stream = fetcher.create_request(
        context(vec![server.url("/seg.m4s")]),
        0,
        CancellationToken::new(),
    );
    let (events, error) = collect(stream).await;

    assert!(error.is_none(), "unexpected error: {error:?}");
    assert!(events
        .iter()
        .any(|e| matches!(e, RequestEvent::Chunk { bytes } if bytes[..] == segment[..])));
}

#[tokio::test]
async fn cancellation_stops_event_flow() {
    let server = TestHttpServer::new(Router::new().route(
        "/seg.m4s",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Vec::new()
        }),
    ))
    .await;

    let fetcher = fetcher(FetchOptions::default());
    let cancel = CancellationToken::new();
    let mut stream = fetcher.create_request(
        context(vec![server.url("/seg.m4s")]),
        0,
        cancel.clone(),
    );

    assert!(matches!(
        stream.next().await,
        Some(Ok(RequestEvent::Begin { .. }))
    ));

    cancel.cancel();
    let mut saw_cancelled = false;
    while let Some(item) = stream.next().await {
        match item {
            Err(FetchError::Cancelled) => saw_cancelled = true,
            other => panic!("no events may follow cancellation: {other:?}"),
        }
    }
    assert!(saw_cancelled);
}
