//! Per-connection handling: handshake, identity, then authorization.
//!
//! Every failure here is confined to the one connection; it is logged,
//! counted, and the connection is dropped.

use crate::authorizer::Authorization;
use crate::error::TlsError;
use crate::identity::party_identity;
use crate::server::Relay;
use crate::tls::TlsSession;
use rendezvous_types::PartyId;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Drive one accepted connection until it is parked, paired or rejected.
///
/// For the connection that completes a pair this also waits for the
/// forwarding to finish.
pub async fn handle_connection(relay: Arc<Relay>, stream: TcpStream, addr: SocketAddr) {
    let metrics = relay.metrics();

    let (transport, session, party) = match authenticate(&relay, stream).await {
        Ok(accepted) => accepted,
        Err(e) => {
            metrics.handshake_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(addr = %addr, "Rejecting connection: {}", e);
            return;
        }
    };
    tracing::info!(
        addr = %addr,
        party = %party,
        sni = session.server_name().unwrap_or("-"),
        "Party authenticated"
    );

    match relay
        .authorizer()
        .authorize(party.clone(), transport, session)
        .await
    {
        Ok(Authorization::Parked(_)) => {}
        Ok(Authorization::Paired { forwarding, .. }) => {
            if let Err(e) = forwarding.await {
                tracing::error!(party = %party, "Forwarding task failed: {}", e);
            }
        }
        Err(e) => {
            metrics.authorization_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(addr = %addr, party = %party, "Authorization failed: {}", e);
        }
    }
}

/// TLS handshake under the handshake deadline, then the peer's identity.
async fn authenticate(
    relay: &Relay,
    stream: TcpStream,
) -> Result<(TcpStream, TlsSession, PartyId), TlsError> {
    let deadline = relay.config().limits.handshake_timeout();

    let tls = timeout(deadline, relay.acceptor().accept(stream))
        .await
        .map_err(|_| {
            TlsError::Handshake(format!("timed out after {}s", deadline.as_secs()))
        })?
        .map_err(|e| TlsError::Handshake(e.to_string()))?;

    let (transport, session) = TlsSession::split(tls);
    let party = party_identity(&session)?;
    Ok((transport, session, party))
}
