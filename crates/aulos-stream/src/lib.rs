#![forbid(unsafe_code)]

//! Stream controllers: the glue between clock, ABR, fetcher and sink.
//!
//! A [`PeriodStream`] supervises one track kind of one period, owning the
//! segment sink. It runs an [`AdaptationStream`] for the chosen track,
//! which in turn runs one [`RepresentationStream`] for the representation
//! the ABR estimator picked. Representation switches tear the inner stream
//! down and rebuild it; codec-incompatible switches surface as media-source
//! reload requests instead.

mod adaptation;
mod error;
mod period;
mod priority;
mod representation;
mod types;

pub use adaptation::{AdaptationStream, AdaptationStreamContext, SwitchStrategy, switch_strategy};
pub use error::{StreamError, StreamResult};
pub use period::{PeriodStream, PeriodStreamContext};
pub use priority::{PrioritySteps, priority_for_distance};
pub use representation::{RepresentationStream, RepresentationStreamContext};
pub use types::{ParseContext, ParsedSegment, PassthroughParser, SegmentParser, StreamOptions};
