//! Background eviction of parked connections whose peer never came.
//!
//! One task sweeps the store periodically instead of a timer per parked
//! connection, so pairing leaves nothing behind to cancel.

use crate::config::LimitsConfig;
use crate::server::RelayMetrics;
use crate::store::ConnectionStore;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// Longest gap between two sweeps.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Spawn the background eviction task.
///
/// Does nothing when `pending_timeout_secs` is 0. Returns a handle that can
/// be used to abort the task.
pub fn spawn_eviction_task<T>(
    store: Arc<ConnectionStore<T>>,
    metrics: Arc<RelayMetrics>,
    limits: LimitsConfig,
) -> tokio::task::JoinHandle<()>
where
    T: Send + Sync + 'static,
{
    tokio::spawn(async move {
        let Some(max_age) = limits.pending_timeout() else {
            tracing::info!("Eviction disabled, parked connections wait forever");
            return;
        };

        let sweep = max_age.clamp(Duration::from_secs(1), MAX_SWEEP_INTERVAL);
        tracing::info!(
            "Eviction task started (timeout: {}s, sweep: {}s)",
            max_age.as_secs(),
            sweep.as_secs()
        );

        let mut timer = interval(sweep);

        loop {
            timer.tick().await;

            let evicted = evict_expired(&store, &metrics, max_age);
            if evicted > 0 {
                tracing::info!("Eviction: closed {} connections", evicted);
            } else {
                tracing::debug!("Eviction: nothing expired");
            }
        }
    })
}

/// Close every connection parked for at least `max_age`.
///
/// Returns how many were closed. A connection claimed by its peer between
/// the scan and the removal is left alone.
pub fn evict_expired<T>(
    store: &ConnectionStore<T>,
    metrics: &RelayMetrics,
    max_age: Duration,
) -> usize {
    let mut evicted = 0;

    for ticket in store.expired(max_age) {
        if let Some(conn) = store.reclaim(&ticket) {
            tracing::warn!(
                key = %ticket.key,
                "Peer did not arrive within {}s, closing",
                max_age.as_secs()
            );
            drop(conn);
            evicted += 1;
        }
    }

    metrics
        .evictions_total
        .fetch_add(evicted as u64, Ordering::Relaxed);
    evicted
}
