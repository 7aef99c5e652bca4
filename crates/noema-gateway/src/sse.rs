// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-Sent Events progress streaming.
//!
//! Wraps a bus subscription in a long-lived HTTP response. Heartbeat
//! comments keep intermediaries from closing idle connections; dropping
//! the response stream (client disconnect) drops the subscription and the
//! connection-gauge permit with it.
//!
//! SSE frame format:
//! ```text
//! event: thought_agent_completed
//! data: {"event_id": "...", "thought_id": "...", "agent_number": 2, ...}
//! ```

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use futures::StreamExt;
use tracing::{debug, warn};

use noema_core::EventEnvelope;

use crate::server::GatewayState;

/// `GET /v1/users/{user_id}/events` — subscribe to a user's progress.
pub async fn stream_progress(
    State(state): State<GatewayState>,
    Path(user_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    let Some(permit) = state.connections.clone().try_acquire() else {
        warn!(user_id = %user_id, "subscription cap reached; rejecting");
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "subscription limit reached on this instance".to_string(),
        ));
    };

    let subscription = state.bus.subscribe(&user_id).await.map_err(|e| {
        warn!(error = %e, user_id = %user_id, "bus subscribe failed");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "progress bus unavailable".to_string(),
        )
    })?;

    debug!(user_id = %user_id, active = state.connections.active(), "sse subscription opened");

    // The permit rides inside the stream so a client disconnect releases
    // both the gauge slot and the bus subscription.
    let events = subscription.filter_map(move |envelope| {
        let _held = &permit;
        futures::future::ready(to_sse_event(&envelope).map(Ok::<_, Infallible>))
    });

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(state.heartbeat)
            .text("heartbeat"),
    ))
}

/// Render an envelope as an SSE frame; unserializable events are skipped.
fn to_sse_event(envelope: &EventEnvelope) -> Option<Event> {
    match envelope.to_json() {
        Ok(json) => Some(
            Event::default()
                .event(envelope.body.event_type())
                .id(envelope.event_id.clone())
                .data(json),
        ),
        Err(e) => {
            warn!(error = %e, "skipping unserializable progress event");
            None
        }
    }
}
