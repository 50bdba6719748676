#![forbid(unsafe_code)]

//! Playback clock for adaptive streaming.
//!
//! [`PlaybackObserver`] samples an abstract [`MediaElement`] on a fixed
//! interval plus on media events, and derives the rebuffering and freezing
//! statuses the rest of the engine keys off. Observations carry monotonic
//! timestamps and replay the latest value to new subscribers.

mod media;
mod observation;
mod observer;
mod options;
mod status;

pub use media::{MediaElement, MediaEvent, PlayError};
pub use observation::{Freezing, Observation, RebufferReason, Rebuffering};
pub use observer::PlaybackObserver;
pub use options::ClockOptions;
