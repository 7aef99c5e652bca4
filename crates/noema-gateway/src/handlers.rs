// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingest and health handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use noema_broker::SubmitOutcome;
use noema_core::types::MAX_THOUGHT_CHARS;

use crate::server::GatewayState;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub user_id: String,
    pub text: String,
    #[serde(default)]
    pub priority_hint: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub thought_id: String,
    pub accepted: bool,
    /// `stream` when the broker took the work order; `deferred` when the
    /// thought waits in `pending` for the sweeper or batch fallback.
    pub mode: &'static str,
}

/// Bounds on an acceptable thought body.
pub fn validate_text(text: &str) -> Result<(), String> {
    let chars = text.chars().count();
    if chars == 0 {
        return Err("text must not be empty".to_string());
    }
    if chars > MAX_THOUGHT_CHARS {
        return Err(format!("text exceeds {MAX_THOUGHT_CHARS} characters ({chars})"));
    }
    Ok(())
}

/// `POST /v1/thoughts` — accept a thought and enqueue it.
///
/// Always returns quickly; downstream state is communicated via the
/// progress stream and the persisted status, never by blocking here.
pub async fn submit_thought(
    State(state): State<GatewayState>,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), (StatusCode, String)> {
    if request.user_id.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "user_id must not be empty".into()));
    }
    validate_text(&request.text).map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    let thought_id = uuid::Uuid::new_v4().to_string();
    state
        .sink
        .insert(&thought_id, &request.user_id, &request.text)
        .await
        .map_err(|e| {
            warn!(error = %e, "ingest insert failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "storage unavailable".to_string(),
            )
        })?;

    let mode = match state
        .producer
        .submit(
            &thought_id,
            &request.user_id,
            &request.text,
            request.priority_hint.clone(),
        )
        .await
    {
        Ok(SubmitOutcome::Published) => "stream",
        Ok(SubmitOutcome::Deferred) => "deferred",
        Err(failure) => {
            // The row is already pending; the sweeper republishes it.
            warn!(
                error = %failure,
                thought_id = %thought_id,
                "broker submit failed; thought deferred to the sweeper"
            );
            "deferred"
        }
    };

    info!(thought_id = %thought_id, user_id = %request.user_id, mode, "thought accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            thought_id,
            accepted: true,
            mode,
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub active_subscriptions: usize,
    pub broker_enabled: bool,
}

/// `GET /health` — liveness and gauge readout.
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_seconds: state.start_time.elapsed().as_secs(),
        active_subscriptions: state.connections.active(),
        broker_enabled: state.producer.is_enabled(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_bounds() {
        assert!(validate_text("a").is_ok());
        assert!(validate_text("").is_err());
        assert!(validate_text(&"x".repeat(MAX_THOUGHT_CHARS)).is_ok());
        assert!(validate_text(&"x".repeat(MAX_THOUGHT_CHARS + 1)).is_err());
        // Multi-byte characters count as characters, not bytes.
        assert!(validate_text(&"思".repeat(MAX_THOUGHT_CHARS)).is_ok());
    }
}
