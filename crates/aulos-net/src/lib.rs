#![forbid(unsafe_code)]

//! HTTP transport for segment and manifest requests.
//!
//! [`HttpClient`] is a thin reqwest wrapper behind the [`Net`] trait;
//! [`NetExt`] layers retry and timeout decorators on any implementation.
//! [`CdnPrioritizer`] orders candidate origins by a moving score, and
//! [`cmcd`] decorates outgoing requests with common media client data.

pub mod cmcd;

mod cdn;
mod client;
mod error;
mod retry;
mod timeout;
mod traits;
mod types;

pub use cdn::{CdnOptions, CdnPrioritizer, origin_key};
pub use client::HttpClient;
pub use error::{NetError, NetResult};
pub use retry::{BackoffPolicy, RetryNet};
pub use timeout::TimeoutNet;
pub use traits::{ByteStream, Net, NetExt};
pub use types::{Headers, NetOptions, RangeSpec};
