//! Rendezvous authorization: pair a new connection with its waiting peer,
//! or park it until the peer arrives.
//!
//! ```text
//! read AuthRequest ──► peer parked under (dest, me, tag)?
//!                        │ no                    │ yes
//!                        ▼                       ▼
//!                 park under (me, dest, tag)   Ready{SERVER} → waiting peer
//!                 (no response yet)            Ready{CLIENT} → this party
//!                                              TLS closed on both, transports
//!                                              handed to the forwarder
//! ```
//!
//! The party that was waiting gets the server role for the end-to-end
//! session and is told first; the party that completed the pair gets the
//! client role. If either exchange fails both connections are closed.
//!
//! Parked connections whose peer never comes are closed by the sweep in
//! [`crate::eviction`].

use crate::config::LimitsConfig;
use crate::error::{ProtocolError, ProtocolResult, RelayError};
use crate::forwarder::{forward, ForwardStats};
use crate::server::RelayMetrics;
use crate::store::{Arrival, ConnectionStore, ParkTicket, PendingConnection};
use crate::tls::TlsSession;
use rendezvous_types::{
    AuthRequest, ConnectionKey, PartyId, Ready, TlsMode, MAX_AUTH_REQUEST_SIZE,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Outcome of a successful authorization.
#[derive(Debug)]
pub enum Authorization {
    /// No peer yet; the connection is parked and gets no response.
    Parked(ParkTicket),
    /// The pair is complete and forwarding has started.
    Paired {
        /// Key of the connection that completed the pair.
        key: ConnectionKey,
        /// Forwarding task; resolves once both directions are done.
        forwarding: JoinHandle<ForwardStats>,
    },
}

/// Matches arriving connections against parked ones.
pub struct Authorizer<T> {
    store: Arc<ConnectionStore<T>>,
    limits: LimitsConfig,
    metrics: Arc<RelayMetrics>,
}

impl<T> Clone for Authorizer<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            limits: self.limits.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<T> Authorizer<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static,
{
    /// Create an authorizer over a shared store.
    pub fn new(
        store: Arc<ConnectionStore<T>>,
        limits: LimitsConfig,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            store,
            limits,
            metrics,
        }
    }

    /// The store this authorizer parks connections in.
    pub fn store(&self) -> &Arc<ConnectionStore<T>> {
        &self.store
    }

    /// Authorize a freshly authenticated connection from `party`.
    ///
    /// On error the connection has been dropped and nothing it touched is
    /// left in the store.
    pub async fn authorize(
        &self,
        party: PartyId,
        mut transport: T,
        mut session: TlsSession,
    ) -> Result<Authorization, RelayError> {
        let request = timeout(
            self.limits.handshake_timeout(),
            read_auth_request(&mut session, &mut transport),
        )
        .await
        .map_err(|_| ProtocolError::Timeout {
            operation: "authorization request",
        })??;

        let key = ConnectionKey::new(party, request.destination, request.tag);
        tracing::debug!(key = %key, "Authorization request");

        self.pair_or_park(key, PendingConnection { transport, session })
            .await
    }

    async fn pair_or_park(
        &self,
        key: ConnectionKey,
        local: PendingConnection<T>,
    ) -> Result<Authorization, RelayError> {
        match self
            .store
            .claim_or_park(key.clone(), local, self.limits.max_pending)?
        {
            Arrival::Parked(ticket) => {
                tracing::info!(
                    party = %key.source,
                    peer = %key.destination,
                    tag = %key.tag,
                    "Waiting for peer"
                );
                Ok(Authorization::Parked(ticket))
            }
            Arrival::Matched { peer, local } => self.pair(key, local, peer).await,
        }
    }

    /// Run the ready exchange for a matched pair and start forwarding.
    ///
    /// Both connections are already out of the store, so a failed exchange
    /// is rolled back by dropping them.
    async fn pair(
        &self,
        key: ConnectionKey,
        local: PendingConnection<T>,
        peer: PendingConnection<T>,
    ) -> Result<Authorization, RelayError> {
        let PendingConnection {
            transport: mut server_io,
            session: mut server_tls,
        } = peer;
        let PendingConnection {
            transport: mut client_io,
            session: mut client_tls,
        } = local;

        let ready_timeout = self.limits.ready_timeout();
        let handshake = async {
            send_ready(&mut server_tls, &mut server_io, TlsMode::Server, ready_timeout).await?;
            send_ready(&mut client_tls, &mut client_io, TlsMode::Client, ready_timeout).await
        };

        if let Err(e) = handshake.await {
            self.metrics.rollbacks_total.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(key = %key, "Ready exchange failed, closing both parties: {}", e);
            return Err(e.into());
        }
        drop(server_tls);
        drop(client_tls);

        tracing::info!(
            server = %key.destination,
            client = %key.source,
            tag = %key.tag,
            "Pair complete, TLS closed, forwarding"
        );
        self.metrics.pairings_total.fetch_add(1, Ordering::Relaxed);
        self.metrics.active_pairs.fetch_add(1, Ordering::Relaxed);

        let metrics = self.metrics.clone();
        let pair_key = key.clone();
        let forwarding = tokio::spawn(async move {
            let stats = forward(server_io, client_io).await;

            metrics
                .bytes_forwarded
                .fetch_add(stats.total(), Ordering::Relaxed);
            metrics.active_pairs.fetch_sub(1, Ordering::Relaxed);

            tracing::info!(
                server = %pair_key.destination,
                client = %pair_key.source,
                tag = %pair_key.tag,
                "Forwarding finished, bytes transferred ({}, {})",
                stats.first_to_second,
                stats.second_to_first
            );
            stats
        });

        Ok(Authorization::Paired { key, forwarding })
    }
}

/// Read the authorization request from a fresh session.
///
/// Reads until the bytes form a complete JSON object, never more than
/// [`MAX_AUTH_REQUEST_SIZE`] bytes.
pub async fn read_auth_request<T>(
    session: &mut TlsSession,
    io: &mut T,
) -> ProtocolResult<AuthRequest>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; MAX_AUTH_REQUEST_SIZE];
    let mut filled = 0;

    loop {
        let n = session.read(io, &mut buf[filled..]).await?;
        if n == 0 {
            return Err(ProtocolError::InvalidMessage {
                reason: "session closed before the request was complete".to_string(),
            });
        }
        filled += n;

        match AuthRequest::from_bytes(&buf[..filled]) {
            Ok(request) => return Ok(request),
            Err(e) if e.is_incomplete() => {
                if filled == buf.len() {
                    return Err(ProtocolError::TooLarge {
                        limit: MAX_AUTH_REQUEST_SIZE,
                    });
                }
            }
            Err(e) => {
                return Err(ProtocolError::InvalidMessage {
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// Tell one party its role, then tear down TLS on its connection.
///
/// Sends `Ready`, sends `close_notify` and waits for the party's own
/// `close_notify`, leaving the transport positioned at the first byte the
/// party sends in the clear.
pub async fn send_ready<T>(
    session: &mut TlsSession,
    io: &mut T,
    mode: TlsMode,
    deadline: Duration,
) -> ProtocolResult<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let bytes = Ready::new(mode).to_bytes()?;

    timeout(deadline, async {
        session.write_all(io, &bytes).await?;
        session.close(io).await?;
        session.await_close(io).await
    })
    .await
    .map_err(|_| ProtocolError::Timeout {
        operation: "ready exchange",
    })?
}
