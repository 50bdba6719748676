#![forbid(unsafe_code)]

//! aulos: an adaptive streaming engine for segmented media.
//!
//! Given a parsed presentation description ([`aulos_media::Manifest`]), the
//! engine continuously picks the best encoding per track, fetches media
//! segments with backpressure and prioritization, and feeds them into a
//! downstream [`aulos_sink::SegmentSink`] while tracking playback state
//! through an abstract [`aulos_clock::MediaElement`].
//!
//! The pieces compose bottom-up and are usable on their own; [`Session`]
//! wires them for the common case.

mod error;
mod init;
mod options;
mod session;

pub use error::{AulosError, AulosResult};
pub use init::{AutoplayOutcome, InitOrchestrator, InitOptions, InitPhase, InitResult, StartAt};
pub use options::AulosParams;
pub use session::{Session, SessionContext};

pub use aulos_clock::{MediaElement, Observation, PlaybackObserver};
pub use aulos_events::{Event, EventBus, PlayerEvent, StreamEvent};
pub use aulos_media::{Manifest, SharedReference};
pub use aulos_sink::SegmentSink;
pub use aulos_stream::SegmentParser;
