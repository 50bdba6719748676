use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::get,
};
use aulos_net::{HttpClient, Net, NetError, NetExt, NetOptions, RangeSpec};
use aulos_test_utils::TestHttpServer;
use futures::StreamExt;

fn client() -> HttpClient {
    HttpClient::new(&NetOptions::default()).expect("build client")
}

#[tokio::test]
async fn get_bytes_fetches_body() {
    let server = TestHttpServer::new(Router::new().route("/seg.m4s", get(|| async { "abcdef" }))).await;
    let bytes = client().get_bytes(server.url("/seg.m4s"), None).await.unwrap();
    assert_eq!(&bytes[..], b"abcdef");
}

#[tokio::test]
async fn error_status_is_reported() {
    let server = TestHttpServer::new(
        Router::new().route("/gone", get(|| async { StatusCode::NOT_FOUND })),
    )
    .await;
    let err = client().get_bytes(server.url("/gone"), None).await.unwrap_err();
    assert!(matches!(err, NetError::Status { status: 404, .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn range_header_is_sent() {
    async fn echo_range(headers: HeaderMap) -> String {
        headers
            .get("range")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("missing")
            .to_string()
    }

    let server = TestHttpServer::new(Router::new().route("/seg.m4s", get(echo_range))).await;
    let bytes = client()
        .get_range(server.url("/seg.m4s"), RangeSpec::new(100, Some(200)), None)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"bytes=100-199");
}

#[tokio::test]
async fn stream_yields_chunks() {
    let server =
        TestHttpServer::new(Router::new().route("/seg.m4s", get(|| async { vec![7u8; 4096] })))
            .await;
    let mut stream = client().stream(server.url("/seg.m4s"), None).await.unwrap();

    let mut total = 0;
    while let Some(chunk) = stream.next().await {
        total += chunk.unwrap().len();
    }
    assert_eq!(total, 4096);
}

#[tokio::test]
async fn retry_decorator_recovers_from_503() {
    #[derive(Clone)]
    struct Flaky(Arc<AtomicU32>);

    async fn handler(State(Flaky(calls)): State<Flaky>) -> Result<String, StatusCode> {
        if calls.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(StatusCode::SERVICE_UNAVAILABLE)
        } else {
            Ok("recovered".to_string())
        }
    }

    let calls = Arc::new(AtomicU32::new(0));
    let server = TestHttpServer::new(
        Router::new()
            .route("/seg.m4s", get(handler))
            .with_state(Flaky(calls.clone())),
    )
    .await;

    let options = NetOptions {
        backoff_base: std::time::Duration::from_millis(1),
        backoff_max: std::time::Duration::from_millis(2),
        ..NetOptions::default()
    };
    let net = client().with_retry(&options);

    let bytes = net.get_bytes(server.url("/seg.m4s"), None).await.unwrap();
    assert_eq!(&bytes[..], b"recovered");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn head_exposes_content_length() {
    let server = TestHttpServer::new(Router::new().route("/seg.m4s", get(|| async { "12345" }))).await;
    let headers = client().head(server.url("/seg.m4s"), None).await.unwrap();
    assert_eq!(headers.get("content-length"), Some("5"));
}
