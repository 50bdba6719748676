use aulos_clock::PlayError;
use aulos_net::NetError;
use aulos_stream::StreamError;
use thiserror::Error;

pub type AulosResult<T> = Result<T, AulosError>;

/// Top-level engine errors.
#[derive(Debug, Error)]
pub enum AulosError {
    #[error("stream: {0}")]
    Stream(#[from] StreamError),

    #[error("network: {0}")]
    Net(#[from] NetError),

    #[error("playback: {0}")]
    Play(#[from] PlayError),

    #[error("no sink registered for any track kind")]
    NoSinks,

    #[error("cancelled")]
    Cancelled,
}
