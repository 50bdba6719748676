use std::{
    collections::HashSet,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use aulos_media::RepresentationId;
use aulos_net::{BackoffPolicy, CdnPrioritizer, Headers, Net, NetError, RangeSpec, cmcd, origin_key};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::{
    BoxScanner, CustomLoaderOutcome, CustomSegmentLoader, FetchContext, FetchError, FetchOptions,
    FetchResult, MetricsSample, RequestEvent, TaskPrioritizer, check_integrity,
    prioritizer::PrioritizerOptions,
};

pub type FetchStream = Pin<Box<dyn Stream<Item = FetchResult<RequestEvent>> + Send>>;

/// Callback receiving one metrics sample per completed transfer.
pub type MetricsCallback = Arc<dyn Fn(MetricsSample) + Send + Sync>;

type InflightSet = Arc<Mutex<HashSet<(RepresentationId, u64)>>>;

struct InflightGuard {
    key: (RepresentationId, u64),
    set: InflightSet,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
    }
}

/// Turns segment requests into prioritized, retrying event streams.
///
/// Stateless with respect to segments: everything request-scoped lives in
/// the returned stream. Holds the CDN scores and the task prioritizer for
/// the lifetime of one playback session.
///
/// A mid-stream failure of a chunked transfer restarts the whole segment,
/// so chunks already emitted may repeat; identical-range appends are
/// harmless downstream.
pub struct SegmentFetcher {
    net: Arc<dyn Net>,
    cdn: Arc<CdnPrioritizer>,
    prioritizer: TaskPrioritizer,
    backoff: BackoffPolicy,
    options: FetchOptions,
    custom_loader: Option<Arc<dyn CustomSegmentLoader>>,
    metrics: Option<MetricsCallback>,
    next_request_id: AtomicU64,
    inflight: InflightSet,
}

impl SegmentFetcher {
    #[must_use]
    pub fn new(
        net: Arc<dyn Net>,
        cdn: Arc<CdnPrioritizer>,
        backoff: BackoffPolicy,
        options: FetchOptions,
    ) -> Self {
        Self {
            net,
            cdn,
            prioritizer: TaskPrioritizer::new(PrioritizerOptions::default()),
            backoff,
            options,
            custom_loader: None,
            metrics: None,
            next_request_id: AtomicU64::new(0),
            inflight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Route buffered loads through an application-provided loader first.
    #[must_use]
    pub fn with_custom_loader(mut self, loader: Arc<dyn CustomSegmentLoader>) -> Self {
        self.custom_loader = Some(loader);
        self
    }

    /// Report completed transfers (for the ABR bandwidth estimator).
    #[must_use]
    pub fn with_metrics(mut self, callback: MetricsCallback) -> Self {
        self.metrics = Some(callback);
        self
    }

    /// Scheduler shared by all requests of this fetcher.
    #[must_use]
    pub fn prioritizer(&self) -> &TaskPrioritizer {
        &self.prioritizer
    }

    #[must_use]
    pub fn cdn(&self) -> &Arc<CdnPrioritizer> {
        &self.cdn
    }

    /// Create a lazy request: nothing happens until the stream is polled.
    ///
    /// Events arrive in order `Begin`, then per attempt any number of
    /// `Progress`/`Chunk` and at most one `Retry`, then `ChunkComplete` and
    /// `Ended` on success. Errors are terminal. At most one request may be
    /// in flight per `(representation, segment)`; a second one fails with
    /// [`FetchError::DuplicateRequest`] immediately.
    #[must_use]
    pub fn create_request(
        &self,
        context: FetchContext,
        priority: i32,
        cancel: CancellationToken,
    ) -> FetchStream {
        let net = self.net.clone();
        let cdn = self.cdn.clone();
        let prioritizer = self.prioritizer.clone();
        let backoff = self.backoff.clone();
        let options = self.options.clone();
        let custom_loader = self.custom_loader.clone();
        let metrics = self.metrics.clone();
        let inflight = self.inflight.clone();
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);

        Box::pin(async_stream::stream! {
            let key = (context.representation, context.segment.id);
            if !inflight.lock().insert(key) {
                yield Err(FetchError::DuplicateRequest);
                return;
            }
            let _guard = InflightGuard { key, set: inflight };

            let mut handle = prioritizer.register(priority);
            yield Ok(RequestEvent::Begin { request_id });

            let started = Instant::now();
            let chunked = options.low_latency
                && !context.segment.is_init
                && context.container.supports_chunked();

            let mut attempt: u32 = 0;
            let mut tried_hosts: HashSet<String> = HashSet::new();
            let mut last_error: Option<FetchError> = None;

            'attempts: loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        yield Err(FetchError::Cancelled);
                        return;
                    }
                    () = handle.wait_until_runnable() => {}
                }

                // CDN selection: failed hosts advance to the next candidate
                // first; only a full cycle of failures consumes retry budget.
                let candidates = cdn.sort_candidates(&context.segment.urls);
                if candidates.is_empty() {
                    yield Err(FetchError::NoUrl);
                    return;
                }
                let url = candidates
                    .iter()
                    .find(|u| !tried_hosts.contains(&origin_key(u)))
                    .cloned();
                let Some(url) = url else {
                    let error = last_error.take().unwrap_or(FetchError::NoUrl);
                    if !backoff.allows_retry(attempt) {
                        yield Err(FetchError::Net(NetError::RetryExhausted {
                            attempts: attempt + 1,
                            source: Box::new(match error {
                                FetchError::Net(e) => e,
                                other => NetError::Transfer(other.to_string()),
                            }),
                        }));
                        return;
                    }
                    attempt += 1;
                    let delay = backoff.delay_for_attempt(attempt);
                    debug!(request_id, attempt, ?delay, "all CDNs failed, backing off");
                    tokio::select! {
                        () = cancel.cancelled() => {
                            yield Err(FetchError::Cancelled);
                            return;
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                    tried_hosts.clear();
                    continue 'attempts;
                };

                let (url, headers) = decorate_request(&options, &context, url);
                let attempt_started = Instant::now();

                if chunked {
                    // Streamed path: emit moof+mdat pairs as they complete.
                    let opened = tokio::select! {
                        () = cancel.cancelled() => {
                            yield Err(FetchError::Cancelled);
                            return;
                        }
                        () = handle.interrupted() => continue 'attempts,
                        r = net.stream(url.clone(), headers.clone()) => r,
                    };
                    let mut byte_stream = match opened {
                        Ok(s) => s,
                        Err(e) => {
                            let error = FetchError::Net(e);
                            if !error.is_retryable() {
                                yield Err(error);
                                return;
                            }
                            cdn.report_failure(&url);
                            tried_hosts.insert(origin_key(&url));
                            last_error = Some(error.clone());
                            yield Ok(RequestEvent::Retry { error });
                            continue 'attempts;
                        }
                    };

                    let mut scanner = BoxScanner::new();
                    let mut loaded: u64 = 0;
                    let mut failed: Option<FetchError> = None;

                    loop {
                        let next = tokio::select! {
                            () = cancel.cancelled() => {
                                yield Err(FetchError::Cancelled);
                                return;
                            }
                            () = handle.interrupted() => continue 'attempts,
                            item = byte_stream.next() => item,
                        };
                        match next {
                            Some(Ok(bytes)) => {
                                loaded += bytes.len() as u64;
                                match scanner.push(&bytes) {
                                    Ok(chunks) => {
                                        for chunk in chunks {
                                            yield Ok(RequestEvent::Chunk { bytes: chunk });
                                        }
                                    }
                                    Err(error) => {
                                        failed = Some(error);
                                        break;
                                    }
                                }
                                yield Ok(RequestEvent::Progress {
                                    loaded,
                                    total: None,
                                    elapsed: attempt_started.elapsed(),
                                });
                            }
                            Some(Err(e)) => {
                                failed = Some(FetchError::Net(e));
                                break;
                            }
                            None => break,
                        }
                    }

                    if let Some(error) = failed {
                        if !error.is_retryable() {
                            yield Err(error);
                            return;
                        }
                        cdn.report_failure(&url);
                        tried_hosts.insert(origin_key(&url));
                        last_error = Some(error.clone());
                        yield Ok(RequestEvent::Retry { error });
                        continue 'attempts;
                    }

                    if let Some(rest) = scanner.finish() {
                        yield Ok(RequestEvent::Chunk { bytes: rest });
                    }

                    let duration = attempt_started.elapsed();
                    cdn.report_success(&url, duration);
                    if let Some(metrics) = &metrics {
                        metrics(MetricsSample {
                            representation: context.representation,
                            segment_id: context.segment.id,
                            size: loaded,
                            duration: started.elapsed(),
                            segment_duration: context.segment_duration,
                        });
                    }
                    yield Ok(RequestEvent::ChunkComplete);
                    yield Ok(RequestEvent::Ended);
                    return;
                }

                // Buffered path: custom loader first, then plain transport.
                let load = buffered_load(
                    &net,
                    custom_loader.as_deref(),
                    &context,
                    &url,
                    headers.clone(),
                    &cancel,
                );
                let result = tokio::select! {
                    () = cancel.cancelled() => {
                        yield Err(FetchError::Cancelled);
                        return;
                    }
                    () = handle.interrupted() => continue 'attempts,
                    r = load => r,
                };

                let outcome = result.and_then(|bytes| {
                    if options.check_integrity {
                        check_integrity(&bytes, context.container)?;
                    }
                    Ok(bytes)
                });

                match outcome {
                    Ok(bytes) => {
                        let duration = attempt_started.elapsed();
                        let loaded = bytes.len() as u64;
                        yield Ok(RequestEvent::Progress {
                            loaded,
                            total: Some(loaded),
                            elapsed: duration,
                        });
                        yield Ok(RequestEvent::Chunk { bytes });
                        cdn.report_success(&url, duration);
                        if let Some(metrics) = &metrics {
                            metrics(MetricsSample {
                                representation: context.representation,
                                segment_id: context.segment.id,
                                size: loaded,
                                duration: started.elapsed(),
                                segment_duration: context.segment_duration,
                            });
                        }
                        yield Ok(RequestEvent::ChunkComplete);
                        yield Ok(RequestEvent::Ended);
                        return;
                    }
                    Err(error) => {
                        if !error.is_retryable() {
                            yield Err(error);
                            return;
                        }
                        warn!(request_id, url = %url, error = %error, "segment attempt failed");
                        cdn.report_failure(&url);
                        tried_hosts.insert(origin_key(&url));
                        last_error = Some(error.clone());
                        yield Ok(RequestEvent::Retry { error });
                        continue 'attempts;
                    }
                }
            }
        })
    }
}

/// Apply CMCD decoration; returns the final URL and headers.
fn decorate_request(
    options: &FetchOptions,
    context: &FetchContext,
    mut url: Url,
) -> (Url, Option<Headers>) {
    let mut headers = Headers::new();
    if let (Some(cmcd_options), Some(payload)) = (&options.cmcd, &context.cmcd) {
        cmcd::decorate(cmcd_options, payload, &mut url, &mut headers);
    }
    let headers = (!headers.is_empty()).then_some(headers);
    (url, headers)
}

async fn buffered_load(
    net: &Arc<dyn Net>,
    custom_loader: Option<&dyn CustomSegmentLoader>,
    context: &FetchContext,
    url: &Url,
    headers: Option<Headers>,
    cancel: &CancellationToken,
) -> FetchResult<Bytes> {
    if let Some(loader) = custom_loader {
        match loader.load(url, context, cancel).await? {
            CustomLoaderOutcome::Resolved { data, .. } => return Ok(data),
            CustomLoaderOutcome::Fallback => {}
        }
    }

    let bytes = match &context.segment.byte_range {
        Some(range) => {
            net.get_range(
                url.clone(),
                RangeSpec::new(range.start, Some(range.end)),
                headers,
            )
            .await?
        }
        None => net.get_bytes(url.clone(), headers).await?,
    };
    Ok(bytes)
}
