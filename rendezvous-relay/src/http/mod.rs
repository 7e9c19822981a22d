//! HTTP endpoints for rendezvous-relay.
//!
//! Provides health checks and Prometheus metrics.

pub mod health;
mod metrics;

use crate::error::RelayError;
use crate::server::Relay;
use axum::{routing::get, Extension, Router};
use std::sync::Arc;
use tokio::net::TcpListener;

pub use health::HealthStatus;

/// Build the HTTP router with all endpoints.
pub fn build_router(relay: Arc<Relay>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/metrics", get(metrics::metrics_handler))
        .layer(Extension(relay))
}

/// Serve the HTTP endpoints on `http.bind_address` until the server fails.
pub async fn serve(relay: Arc<Relay>) -> Result<(), RelayError> {
    let addr = relay.config().http.bind_address.clone();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| RelayError::Bind {
            addr: addr.clone(),
            source,
        })?;

    health::init_start_time();
    tracing::info!(addr = %addr, "HTTP endpoints listening");

    axum::serve(listener, build_router(relay)).await?;
    Ok(())
}
