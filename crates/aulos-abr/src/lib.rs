//! Hybrid adaptive-bitrate estimation.
//!
//! [`AbrEstimator`] combines a two-window EWMA [`BandwidthEstimator`] fed by
//! the segment fetcher, a per-representation maintainability
//! [`ScoreCalculator`], and a buffer-occupancy [`BufferBasedChooser`] into a
//! stream of [`AbrDecision`]s.

mod bandwidth;
mod buffer_based;
mod estimator;
mod score;
mod types;

pub use bandwidth::BandwidthEstimator;
pub use buffer_based::BufferBasedChooser;
pub use estimator::{AbrEstimator, select_optimal};
pub use score::ScoreCalculator;
pub use types::{
    AbrDecision, AbrOptions, PlaybackSignal, RepresentationInfo, RequestProgress, ThroughputSample,
    ThroughputSampleSource,
};
