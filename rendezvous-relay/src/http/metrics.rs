//! Prometheus metrics endpoint.

use crate::server::Relay;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Gauges describe current load; counters are monotonic since startup.
pub async fn metrics_handler(Extension(relay): Extension<Arc<Relay>>) -> impl IntoResponse {
    let m = relay.metrics();
    let snapshot = relay.snapshot();

    let pending = snapshot.pending;
    let active_pairs = snapshot.active_pairs;

    let connections = m.connections_total.load(Ordering::Relaxed);
    let handshake_failures = m.handshake_failures.load(Ordering::Relaxed);
    let authorization_failures = m.authorization_failures.load(Ordering::Relaxed);
    let pairings = m.pairings_total.load(Ordering::Relaxed);
    let rollbacks = m.rollbacks_total.load(Ordering::Relaxed);
    let evictions = m.evictions_total.load(Ordering::Relaxed);
    let bytes = m.bytes_forwarded.load(Ordering::Relaxed);

    let body = format!(
        r#"# HELP rendezvous_relay_pending Connections waiting for their peer
# TYPE rendezvous_relay_pending gauge
rendezvous_relay_pending {pending}

# HELP rendezvous_relay_active_pairs Pairs currently forwarding
# TYPE rendezvous_relay_active_pairs gauge
rendezvous_relay_active_pairs {active_pairs}

# HELP rendezvous_relay_info Server information
# TYPE rendezvous_relay_info gauge
rendezvous_relay_info{{version="{version}"}} 1

# HELP rendezvous_relay_connections_total Total connections accepted
# TYPE rendezvous_relay_connections_total counter
rendezvous_relay_connections_total {connections}

# HELP rendezvous_relay_handshake_failures_total TLS handshakes that failed or carried no identity
# TYPE rendezvous_relay_handshake_failures_total counter
rendezvous_relay_handshake_failures_total {handshake_failures}

# HELP rendezvous_relay_authorization_failures_total Rejected or broken authorization requests
# TYPE rendezvous_relay_authorization_failures_total counter
rendezvous_relay_authorization_failures_total {authorization_failures}

# HELP rendezvous_relay_pairings_total Pairs that completed the ready exchange
# TYPE rendezvous_relay_pairings_total counter
rendezvous_relay_pairings_total {pairings}

# HELP rendezvous_relay_rollbacks_total Pairs torn down during the ready exchange
# TYPE rendezvous_relay_rollbacks_total counter
rendezvous_relay_rollbacks_total {rollbacks}

# HELP rendezvous_relay_evictions_total Waiting connections closed after the pending timeout
# TYPE rendezvous_relay_evictions_total counter
rendezvous_relay_evictions_total {evictions}

# HELP rendezvous_relay_forwarded_bytes_total Bytes forwarded by finished pairs
# TYPE rendezvous_relay_forwarded_bytes_total counter
rendezvous_relay_forwarded_bytes_total {bytes}
"#,
        version = env!("CARGO_PKG_VERSION"),
    );

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
