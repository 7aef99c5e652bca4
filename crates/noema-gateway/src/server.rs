// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Routes:
//! - `POST /v1/thoughts` — ingest a thought (accepted immediately; work
//!   happens downstream).
//! - `GET /v1/users/{user_id}/events` — long-lived SSE progress stream.
//! - `GET /health` — uptime and subscription gauge, unauthenticated.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use noema_broker::ThoughtProducer;
use noema_core::{NoemaError, ProgressBus};
use noema_storage::ThoughtStore;

use crate::handlers;
use crate::sse;

/// Counts live SSE subscriptions against a per-instance cap.
pub struct ConnectionGauge {
    current: AtomicUsize,
    max: usize,
}

impl ConnectionGauge {
    pub fn new(max: usize) -> Self {
        Self {
            current: AtomicUsize::new(0),
            max,
        }
    }

    /// Take a slot; `None` when the cap is reached. The permit releases
    /// the slot on drop.
    pub fn try_acquire(self: Arc<Self>) -> Option<ConnectionPermit> {
        let mut current = self.current.load(Ordering::Acquire);
        loop {
            if current >= self.max {
                return None;
            }
            match self.current.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(ConnectionPermit(self)),
                Err(actual) => current = actual,
            }
        }
    }

    pub fn active(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }
}

/// RAII slot in the connection gauge.
pub struct ConnectionPermit(Arc<ConnectionGauge>);

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub sink: ThoughtStore,
    pub producer: Arc<ThoughtProducer>,
    pub bus: Arc<dyn ProgressBus>,
    pub connections: Arc<ConnectionGauge>,
    /// SSE heartbeat interval.
    pub heartbeat: Duration,
    /// Process start, for the health endpoint.
    pub start_time: Instant,
}

/// Build the gateway router.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/v1/thoughts", post(handlers::submit_thought))
        .route("/v1/users/{user_id}/events", get(sse::stream_progress))
        .route("/health", get(handlers::get_health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the token cancels.
pub async fn start_server(
    host: &str,
    port: u16,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), NoemaError> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| NoemaError::Bus {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    info!("gateway listening on {addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| NoemaError::Bus {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })
}
