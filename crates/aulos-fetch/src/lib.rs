#![forbid(unsafe_code)]

//! Prioritized segment fetching.
//!
//! [`SegmentFetcher`] turns a segment request into a lazy stream of
//! [`RequestEvent`]s with retry, CDN failover, optional low-latency chunked
//! delivery, and integrity checks. In-flight work is scheduled through the
//! generic [`TaskPrioritizer`], which pauses deprioritized transfers in
//! favor of urgent ones.

mod error;
mod fetcher;
mod isobmff;
mod prioritizer;
mod types;

pub use error::{FetchError, FetchErrorKind, FetchResult};
pub use fetcher::{FetchStream, MetricsCallback, SegmentFetcher};
pub use isobmff::{BoxScanner, check_integrity};
pub use prioritizer::{PrioritizerOptions, TaskCommand, TaskHandle, TaskPrioritizer};
pub use types::{
    ContainerKind, CustomLoaderOutcome, CustomSegmentLoader, FetchContext, FetchOptions,
    MetricsSample, RequestEvent,
};
