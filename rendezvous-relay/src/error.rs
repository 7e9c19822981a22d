//! Error types for rendezvous-relay.

use std::path::PathBuf;

use rendezvous_types::{ConnectionKey, WireError};

/// Main error type for relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// TLS setup or handshake error.
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Connection store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Could not bind the listening socket.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried to bind.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Connection store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A pending connection already exists under this key.
    #[error("connection {key} already exists")]
    DuplicateKey {
        /// The occupied key.
        key: ConnectionKey,
    },

    /// No pending connection under this key.
    #[error("no pending connection for {key}")]
    NotFound {
        /// The key that was looked up.
        key: ConnectionKey,
    },

    /// Too many connections are waiting for a peer.
    #[error("too many pending connections (limit: {limit})")]
    Full {
        /// Configured limit.
        limit: usize,
    },
}

/// TLS layer errors.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    /// Failed to load certificates.
    #[error("failed to load certificate from {path}: {reason}")]
    CertLoad {
        /// Path of the PEM file.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Failed to load a private key.
    #[error("failed to load private key from {path}: {reason}")]
    KeyLoad {
        /// Path of the PEM file.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Invalid TLS configuration.
    #[error("TLS configuration error: {0}")]
    Config(String),

    /// Handshake with a party failed.
    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    /// Peer certificate could not be parsed.
    #[error("invalid peer certificate: {0}")]
    Certificate(String),

    /// Peer certificate carries neither a Common Name nor a DNS name.
    #[error("peer certificate carries no party identity")]
    MissingIdentity,
}

/// Protocol layer errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Invalid message format.
    #[error("invalid message format: {reason}")]
    InvalidMessage {
        /// Reason the message is invalid.
        reason: String,
    },

    /// Authorization request exceeded the size limit.
    #[error("message too large (limit: {limit} bytes)")]
    TooLarge {
        /// Maximum allowed size.
        limit: usize,
    },

    /// A blocking step did not finish in time.
    #[error("timed out during {operation}")]
    Timeout {
        /// Step that timed out.
        operation: &'static str,
    },

    /// Transport closed before the TLS session was closed.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Application data arrived where a TLS close was expected.
    #[error("unexpected data while waiting for TLS close")]
    UnexpectedData,

    /// TLS record processing failed.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Wire format error.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// I/O error on the transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
