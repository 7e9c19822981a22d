//! Identity and pairing key types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The logical name of a party.
///
/// On the relay side this is always derived from an authenticated TLS
/// credential, never from application data.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(String);

impl PartyId {
    /// Create a PartyId from a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the name is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartyId({})", self.0)
    }
}

impl From<&str> for PartyId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Directional key of a pending connection.
///
/// `(A, B, t)` and `(B, A, t)` are distinct keys. The tag separates
/// concurrent sessions between the same two parties; the empty tag is a
/// key of its own.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    /// Party that opened the connection.
    pub source: PartyId,
    /// Party it wants to reach.
    pub destination: PartyId,
    /// Session tag.
    pub tag: String,
}

impl ConnectionKey {
    /// Create a new key.
    pub fn new(source: PartyId, destination: PartyId, tag: impl Into<String>) -> Self {
        Self {
            source,
            destination,
            tag: tag.into(),
        }
    }

    /// The key the other side of this pair would be parked under.
    pub fn mirrored(&self) -> Self {
        Self {
            source: self.destination.clone(),
            destination: self.source.clone(),
            tag: self.tag.clone(),
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.destination, self.tag)
    }
}

impl fmt::Debug for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionKey({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirrored_swaps_parties_and_keeps_tag() {
        let key = ConnectionKey::new("alice".into(), "bob".into(), "t1");
        let mirror = key.mirrored();

        assert_eq!(mirror.source, PartyId::new("bob"));
        assert_eq!(mirror.destination, PartyId::new("alice"));
        assert_eq!(mirror.tag, "t1");
        assert_ne!(key, mirror);
        assert_eq!(mirror.mirrored(), key);
    }

    #[test]
    fn empty_tag_is_distinct_key() {
        let untagged = ConnectionKey::new("alice".into(), "bob".into(), "");
        let tagged = ConnectionKey::new("alice".into(), "bob".into(), "t1");
        assert_ne!(untagged, tagged);
    }

    #[test]
    fn key_display() {
        let key = ConnectionKey::new("alice".into(), "bob".into(), "t1");
        assert_eq!(key.to_string(), "alice:bob:t1");
        assert_eq!(format!("{:?}", key), "ConnectionKey(alice:bob:t1)");
    }

    #[test]
    fn party_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&PartyId::new("alice")).unwrap();
        assert_eq!(json, "\"alice\"");
    }
}
