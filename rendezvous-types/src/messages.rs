//! Rendezvous protocol messages.
//!
//! Both messages travel as a single JSON object inside the party's TLS
//! session with the relay. Field names are capitalized on the wire.

use serde::{Deserialize, Serialize};

use crate::{PartyId, WireError};

/// Maximum size of an encoded [`AuthRequest`] in bytes.
pub const MAX_AUTH_REQUEST_SIZE: usize = 512;

/// Role a party takes in the end-to-end session that follows the relay
/// handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum TlsMode {
    /// Accept the end-to-end handshake.
    Server = 1,
    /// Initiate the end-to-end handshake.
    Client = 2,
}

impl TryFrom<u8> for TlsMode {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(TlsMode::Server),
            2 => Ok(TlsMode::Client),
            _ => Err(WireError::InvalidMode(value)),
        }
    }
}

impl From<TlsMode> for u8 {
    fn from(mode: TlsMode) -> Self {
        mode as u8
    }
}

/// Authorization request sent by a party after its TLS handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Party this connection wants to be paired with.
    #[serde(rename = "DestParty")]
    pub destination: PartyId,
    /// Session tag (empty = untagged)
    #[serde(rename = "Tag", default)]
    pub tag: String,
}

impl AuthRequest {
    /// Create a new request.
    pub fn new(destination: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            destination: PartyId::new(destination),
            tag: tag.into(),
        }
    }

    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(WireError::Serialization)
    }

    /// Deserialize from JSON bytes.
    ///
    /// Rejects requests without a destination.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let request: Self = serde_json::from_slice(bytes).map_err(WireError::Deserialization)?;
        if request.destination.is_empty() {
            return Err(WireError::EmptyDestination);
        }
        Ok(request)
    }
}

/// Sent by the relay to each party once the pair is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ready {
    /// The recipient's role.
    #[serde(rename = "Mode")]
    pub mode: TlsMode,
}

impl Ready {
    /// Create a Ready message for the given role.
    pub fn new(mode: TlsMode) -> Self {
        Self { mode }
    }

    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(WireError::Serialization)
    }

    /// Deserialize from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(bytes).map_err(WireError::Deserialization)
    }
}
