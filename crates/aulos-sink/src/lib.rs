#![forbid(unsafe_code)]

//! Segment sink interface.
//!
//! A [`SegmentSink`] is the opaque downstream component (an MSE source
//! buffer, a muxer, a test recorder) accepting encoded media.
//! [`SinkQueue`] serializes operations per sink, tracks init-segment state
//! per representation, and recovers from quota pressure.

pub mod testing;

mod queue;
mod sink;

pub use queue::{QueueOptions, SinkQueue};
pub use sink::{AppendParams, SegmentSink, SinkError, SinkResult};
