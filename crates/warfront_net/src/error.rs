//! Error types for the network layer.

use thiserror::Error;
use warfront_core::error::GameError;

/// Result type alias using [`NetError`].
pub type Result<T> = std::result::Result<T, NetError>;

/// Errors raised around the session: decoding, persistence, transport.
#[derive(Debug, Error)]
pub enum NetError {
    /// Error bubbled up from the simulation core.
    #[error(transparent)]
    Game(#[from] GameError),

    /// A wire message or snapshot was not valid JSON of the right shape.
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem or stdio failure.
    #[error("IO failed: {0}")]
    Io(#[from] std::io::Error),

    /// Host configuration failed to parse or validate.
    #[error("Invalid host configuration: {0}")]
    InvalidConfig(String),

    /// The transport side of a channel went away.
    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),
}
