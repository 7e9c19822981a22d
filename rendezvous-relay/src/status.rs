//! Periodic status reporter.
//!
//! Logs how many connections are waiting and how many pairs are
//! forwarding.

use crate::config::StatusConfig;
use crate::server::RelayMetrics;
use crate::store::ConnectionStore;
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// Point-in-time view of relay load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// Connections parked waiting for a peer.
    pub pending: usize,
    /// Pairs currently forwarding.
    pub active_pairs: u64,
}

impl StatusSnapshot {
    /// Read the current counts.
    pub fn capture<T>(store: &ConnectionStore<T>, metrics: &RelayMetrics) -> Self {
        Self {
            pending: store.count(),
            active_pairs: metrics.active_pairs.load(Ordering::Relaxed),
        }
    }
}

/// Spawn the background status reporter.
///
/// Returns a handle that can be used to abort the task.
pub fn spawn_status_task<T>(
    store: Arc<ConnectionStore<T>>,
    metrics: Arc<RelayMetrics>,
    config: StatusConfig,
) -> tokio::task::JoinHandle<()>
where
    T: Send + Sync + 'static,
{
    tokio::spawn(async move {
        if !config.enabled {
            tracing::info!("Status reporter disabled");
            return;
        }

        let interval_secs = config.interval_secs.max(1);
        tracing::info!("Status reporter started (interval: {}s)", interval_secs);

        let mut timer = interval(Duration::from_secs(interval_secs));

        loop {
            timer.tick().await;

            let snapshot = StatusSnapshot::capture(&store, &metrics);
            tracing::info!(
                pending = snapshot.pending,
                active_pairs = snapshot.active_pairs,
                "Status: {} waiting, {} forwarding",
                snapshot.pending,
                snapshot.active_pairs
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PendingConnection;
    use crate::tls::test_support::server_session;
    use rendezvous_types::{ConnectionKey, PartyId};

    #[test]
    fn snapshot_counts_pending_and_active() {
        let store = ConnectionStore::new();
        let metrics = RelayMetrics::default();

        let key = ConnectionKey::new(PartyId::new("alice"), PartyId::new("bob"), "t1");
        let conn = PendingConnection {
            transport: (),
            session: server_session(),
        };
        store.claim_or_park(key, conn, usize::MAX).unwrap();
        metrics.active_pairs.store(2, Ordering::Relaxed);

        let snapshot = StatusSnapshot::capture(&store, &metrics);
        assert_eq!(
            snapshot,
            StatusSnapshot {
                pending: 1,
                active_pairs: 2
            }
        );
    }

    #[tokio::test]
    async fn status_task_disabled() {
        let store: Arc<ConnectionStore<()>> = Arc::new(ConnectionStore::new());
        let config = StatusConfig {
            interval_secs: 1,
            enabled: false,
        };

        let handle = spawn_status_task(store, Arc::new(RelayMetrics::default()), config);

        tokio::time::timeout(Duration::from_millis(100), handle)
            .await
            .expect("Task should complete when disabled")
            .expect("Task should not panic");
    }

    #[tokio::test]
    async fn status_task_keeps_running_until_aborted() {
        let store: Arc<ConnectionStore<()>> = Arc::new(ConnectionStore::new());
        let config = StatusConfig {
            interval_secs: 0,
            enabled: true,
        };

        let handle = spawn_status_task(store, Arc::new(RelayMetrics::default()), config);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }
}
