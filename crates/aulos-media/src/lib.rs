#![forbid(unsafe_code)]

//! Presentation data model for adaptive streaming.
//!
//! A [`Manifest`] is an ordered sequence of [`Period`]s; each period maps
//! track kinds to [`Adaptation`]s holding [`Representation`]s ordered by
//! bitrate. Components refer to descriptors through id handles resolved via
//! the manifest — descriptors hold no back-pointers.

mod ids;
mod manifest;
mod segment_index;
mod shared_ref;

pub use ids::{AdaptationId, PeriodId, RepresentationId};
pub use manifest::{Adaptation, Manifest, Period, Representation, TrackKind};
pub use segment_index::{SegmentIndex, SegmentInfo, TimelineIndex};
pub use shared_ref::SharedReference;
