//! Error types for the rendezvous wire format.

use thiserror::Error;

/// Errors that can occur while encoding or decoding rendezvous messages.
#[derive(Debug, Error)]
pub enum WireError {
    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// JSON deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// Invalid role discriminator in a Ready message
    #[error("invalid mode: {0}")]
    InvalidMode(u8),

    /// Authorization request names no destination party
    #[error("destination party is empty")]
    EmptyDestination,
}

impl WireError {
    /// Whether decoding failed only because the input ended early.
    ///
    /// Readers use this to decide whether to wait for more bytes.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, WireError::Deserialization(e) if e.is_eof())
    }
}
