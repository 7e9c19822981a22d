//! Registry of connections waiting for their peer.
//!
//! A waiting connection lives in two tables keyed by the same
//! [`ConnectionKey`]: one for the raw transport and one for the TLS session
//! that wraps it. Each table is a [`DashMap`], so lookups proceed
//! concurrently and writes lock only their shard.
//!
//! Arrivals go through [`ConnectionStore::claim_or_park`], which looks for
//! the mirrored key and parks only if nobody is there. Arrivals for the same
//! unordered pair `{a, b, tag}` are serialized, so two parties arriving at
//! once never both park.
//!
//! Claiming is removal: a matched connection is taken out of both tables
//! before the ready exchange starts. Nothing of a pair outlives its pairing,
//! whether the exchange succeeds or is rolled back, and there is nothing to
//! clean up after forwarding.
//!
//! Every parked connection gets an [`EntryId`]. Eviction removes by id, so
//! an eviction that raced a claim never deletes a newer connection parked
//! under the same key.

use crate::error::{StoreError, StoreResult};
use crate::tls::TlsSession;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use rendezvous_types::{ConnectionKey, PartyId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Identifier of one parked connection.
pub type EntryId = u64;

#[derive(Debug)]
struct Entry<V> {
    id: EntryId,
    parked_at: Instant,
    value: V,
}

/// One table of pending values keyed by [`ConnectionKey`].
///
/// At most one value exists per key; inserting an occupied key fails
/// instead of overwriting.
#[derive(Debug)]
pub struct PendingTable<V> {
    entries: DashMap<ConnectionKey, Entry<V>>,
}

impl<V> Default for PendingTable<V> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<V> PendingTable<V> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value. Fails if the key is already present; the existing
    /// value is left untouched.
    pub fn put(&self, key: ConnectionKey, id: EntryId, value: V) -> StoreResult<()> {
        match self.entries.entry(key) {
            MapEntry::Occupied(occupied) => Err(StoreError::DuplicateKey {
                key: occupied.key().clone(),
            }),
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry {
                    id,
                    parked_at: Instant::now(),
                    value,
                });
                Ok(())
            }
        }
    }

    /// Remove and return the value registered under `key`.
    pub fn take(&self, key: &ConnectionKey) -> StoreResult<(EntryId, V)> {
        self.entries
            .remove(key)
            .map(|(_, entry)| (entry.id, entry.value))
            .ok_or_else(|| StoreError::NotFound { key: key.clone() })
    }

    /// Remove and return the value under `key` only if it carries `id`.
    pub fn take_if_id(&self, key: &ConnectionKey, id: EntryId) -> Option<V> {
        self.entries
            .remove_if(key, |_, entry| entry.id == id)
            .map(|(_, entry)| entry.value)
    }

    /// Remove the value under `key` only if it carries `id`.
    ///
    /// Returns whether something was removed. Removing an absent key or a
    /// stale id is a no-op.
    pub fn remove_if_id(&self, key: &ConnectionKey, id: EntryId) -> bool {
        self.take_if_id(key, id).is_some()
    }

    /// Keys and ids of values inserted at least `max_age` ago.
    pub fn expired(&self, max_age: Duration) -> Vec<(ConnectionKey, EntryId)> {
        self.entries
            .iter()
            .filter(|entry| entry.parked_at.elapsed() >= max_age)
            .map(|entry| (entry.key().clone(), entry.id))
            .collect()
    }

    /// Number of values in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A connection waiting for its peer: the raw transport and the TLS
/// session that was negotiated over it.
pub struct PendingConnection<T> {
    /// Raw transport.
    pub transport: T,
    /// TLS state for the transport.
    pub session: TlsSession,
}

impl<T> std::fmt::Debug for PendingConnection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingConnection")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

/// Receipt for a parked connection, used for id-scoped eviction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParkTicket {
    /// Key the connection is parked under.
    pub key: ConnectionKey,
    /// Id of the parked entries.
    pub id: EntryId,
}

/// What happened to an arriving connection.
#[derive(Debug)]
pub enum Arrival<T> {
    /// Nobody was waiting; the connection is now parked.
    Parked(ParkTicket),
    /// The peer was waiting and has been taken out of the store.
    Matched {
        /// The connection that was waiting.
        peer: PendingConnection<T>,
        /// The connection that just arrived.
        local: PendingConnection<T>,
    },
}

/// Both orderings of a [`ConnectionKey`] map to the same pair key.
#[derive(Debug, PartialEq, Eq, Hash)]
struct PairKey {
    low: PartyId,
    high: PartyId,
    tag: String,
}

impl PairKey {
    fn of(key: &ConnectionKey) -> Self {
        let (low, high) = if key.source <= key.destination {
            (&key.source, &key.destination)
        } else {
            (&key.destination, &key.source)
        };
        Self {
            low: low.clone(),
            high: high.clone(),
            tag: key.tag.clone(),
        }
    }
}

/// The two pending tables plus the id allocator.
#[derive(Debug)]
pub struct ConnectionStore<T> {
    transports: PendingTable<T>,
    sessions: PendingTable<TlsSession>,
    gates: DashMap<PairKey, ()>,
    next_id: AtomicU64,
}

impl<T> Default for ConnectionStore<T> {
    fn default() -> Self {
        Self {
            transports: PendingTable::new(),
            sessions: PendingTable::new(),
            gates: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<T> ConnectionStore<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Match an arriving connection with its waiting peer, or park it.
    ///
    /// The peer is looked up under `key.mirrored()`. Parking fails with
    /// [`StoreError::Full`] once `capacity` connections are waiting and with
    /// [`StoreError::DuplicateKey`] if `key` is already parked; either way
    /// the connection is dropped. Matching is never refused for capacity.
    pub fn claim_or_park(
        &self,
        key: ConnectionKey,
        conn: PendingConnection<T>,
        capacity: usize,
    ) -> StoreResult<Arrival<T>> {
        // The entry holds its shard's write lock until dropped. Nothing is
        // ever inserted into `gates`.
        let _gate = self.gates.entry(PairKey::of(&key));

        if let Some(peer) = self.claim(&key.mirrored())? {
            return Ok(Arrival::Matched { peer, local: conn });
        }

        if self.count() >= capacity {
            return Err(StoreError::Full { limit: capacity });
        }

        self.park(key, conn).map(Arrival::Parked)
    }

    /// Take back a parked connection, if nobody claimed it yet.
    pub fn reclaim(&self, ticket: &ParkTicket) -> Option<PendingConnection<T>> {
        let transport = self.transports.take_if_id(&ticket.key, ticket.id)?;
        let session = self.sessions.take_if_id(&ticket.key, ticket.id)?;
        Some(PendingConnection { transport, session })
    }

    /// Tickets of connections parked at least `max_age` ago.
    pub fn expired(&self, max_age: Duration) -> Vec<ParkTicket> {
        self.transports
            .expired(max_age)
            .into_iter()
            .map(|(key, id)| ParkTicket { key, id })
            .collect()
    }

    /// Number of connections waiting for a peer.
    pub fn count(&self) -> usize {
        self.transports.len()
    }

    /// Number of parked TLS sessions.
    #[cfg(test)]
    pub(crate) fn session_count(&self) -> usize {
        self.sessions.len()
    }

    // Session first, transport second: a visible transport always has its
    // session in place.
    fn park(&self, key: ConnectionKey, conn: PendingConnection<T>) -> StoreResult<ParkTicket> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.sessions.put(key.clone(), id, conn.session)?;
        if let Err(e) = self.transports.put(key.clone(), id, conn.transport) {
            self.sessions.remove_if_id(&key, id);
            return Err(e);
        }

        Ok(ParkTicket { key, id })
    }

    // Transport first: whoever takes the transport owns the connection.
    fn claim(&self, key: &ConnectionKey) -> StoreResult<Option<PendingConnection<T>>> {
        let (id, transport) = match self.transports.take(key) {
            Ok(taken) => taken,
            Err(_) => return Ok(None),
        };

        let session = self
            .sessions
            .take_if_id(key, id)
            .ok_or_else(|| StoreError::NotFound { key: key.clone() })?;

        Ok(Some(PendingConnection { transport, session }))
    }
}
