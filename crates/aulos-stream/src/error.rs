use aulos_fetch::FetchError;
use aulos_media::{AdaptationId, RepresentationId};
use aulos_sink::SinkError;
use thiserror::Error;

pub type StreamResult<T> = Result<T, StreamError>;

/// Stream orchestration errors.
#[derive(Clone, Debug, Error)]
pub enum StreamError {
    #[error("fetch: {0}")]
    Fetch(#[from] FetchError),

    #[error("sink: {0}")]
    Sink(#[from] SinkError),

    #[error("segment parse: {0}")]
    Parse(String),

    #[error("no playable representation remains")]
    NoPlayableRepresentation,

    #[error("unknown representation {0}")]
    UnknownRepresentation(RepresentationId),

    #[error("unknown adaptation {0}")]
    UnknownAdaptation(AdaptationId),
}
