//! Relay supervisor: owns the shared state and runs the accept loop.

use crate::authorizer::Authorizer;
use crate::config::Config;
use crate::error::RelayError;
use crate::eviction::spawn_eviction_task;
use crate::listener::handle_connection;
use crate::status::{spawn_status_task, StatusSnapshot};
use crate::store::ConnectionStore;
use crate::tls::build_acceptor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

/// Operational metrics for monitoring relay activity.
///
/// Counters are monotonically increasing (reset only on restart).
/// `active_pairs` is a gauge.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Total TCP connections accepted.
    pub connections_total: AtomicU64,
    /// TLS handshakes that failed, timed out, or yielded no identity.
    pub handshake_failures: AtomicU64,
    /// Authorization requests that were rejected or broke off.
    pub authorization_failures: AtomicU64,
    /// Pairs that completed the ready exchange.
    pub pairings_total: AtomicU64,
    /// Pairs torn down because one side failed the ready exchange.
    pub rollbacks_total: AtomicU64,
    /// Parked connections closed because their peer never came.
    pub evictions_total: AtomicU64,
    /// Bytes forwarded by finished pairs, both directions.
    pub bytes_forwarded: AtomicU64,
    /// Pairs currently forwarding.
    pub active_pairs: AtomicU64,
}

/// The rendezvous relay.
pub struct Relay {
    config: Config,
    bind_address: String,
    authorizer: Authorizer<TcpStream>,
    metrics: Arc<RelayMetrics>,
    acceptor: TlsAcceptor,
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("bind_address", &self.bind_address)
            .field("config", &self.config)
            .field("metrics", &self.metrics)
            .field("pending", &self.total_pending())
            .finish_non_exhaustive()
    }
}

impl Relay {
    /// Create a relay from config. Loads the TLS material.
    pub fn new(config: Config) -> Result<Self, RelayError> {
        let acceptor = build_acceptor(&config.tls)?;
        let metrics = Arc::new(RelayMetrics::default());
        let authorizer = Authorizer::new(
            Arc::new(ConnectionStore::new()),
            config.limits.clone(),
            metrics.clone(),
        );

        Ok(Self {
            bind_address: config.server.bind_address(),
            config,
            authorizer,
            metrics,
            acceptor,
        })
    }

    /// Install logging and create a relay that will listen on `bind_address`.
    pub fn init(
        config: Config,
        bind_address: impl Into<String>,
        debug: bool,
    ) -> Result<Self, RelayError> {
        crate::logging::init(debug);

        let mut relay = Self::new(config)?;
        relay.bind_address = bind_address.into();
        tracing::debug!("Relay initialized: {:?}", relay);
        Ok(relay)
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Address the listener binds to.
    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// The authorizer shared by every connection.
    pub fn authorizer(&self) -> &Authorizer<TcpStream> {
        &self.authorizer
    }

    /// Connections waiting for their peer.
    pub fn store(&self) -> &Arc<ConnectionStore<TcpStream>> {
        self.authorizer.store()
    }

    /// TLS acceptor for incoming connections.
    pub fn acceptor(&self) -> &TlsAcceptor {
        &self.acceptor
    }

    /// Number of connections waiting for a peer.
    pub fn total_pending(&self) -> usize {
        self.store().count()
    }

    /// Number of pairs currently forwarding.
    pub fn active_pairs(&self) -> u64 {
        self.metrics.active_pairs.load(Ordering::Relaxed)
    }

    /// Current pending and forwarding counts.
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot::capture(self.store(), &self.metrics)
    }

    /// Bind, start the background tasks, and accept connections forever.
    ///
    /// Only a bind failure returns.
    pub async fn start(self: Arc<Self>) -> Result<(), RelayError> {
        let listener = TcpListener::bind(&self.bind_address)
            .await
            .map_err(|source| RelayError::Bind {
                addr: self.bind_address.clone(),
                source,
            })?;
        tracing::info!(addr = %self.bind_address, "Relay listening");

        spawn_status_task(
            self.store().clone(),
            self.metrics.clone(),
            self.config.status.clone(),
        );
        spawn_eviction_task(
            self.store().clone(),
            self.metrics.clone(),
            self.config.limits.clone(),
        );

        if self.config.http.enabled {
            let relay = self.clone();
            tokio::spawn(async move {
                if let Err(e) = crate::http::serve(relay).await {
                    tracing::error!("HTTP server stopped: {}", e);
                }
            });
        }

        self.serve(listener).await;
        Ok(())
    }

    /// Accept connections from an already bound listener.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    continue;
                }
            };

            self.metrics.connections_total.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(addr = %addr, "Connection accepted");

            tokio::spawn(handle_connection(self.clone(), stream, addr));
        }
    }
}
