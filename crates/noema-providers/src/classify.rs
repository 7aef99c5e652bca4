// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared HTTP error classification for provider adapters.
//!
//! Maps transport and HTTP-level failures onto the pipeline failure
//! taxonomy so every provider reports errors the same way. Retry decisions
//! live with the caller; adapters only classify.

use noema_core::{ErrorKind, Failure};

/// Classify an HTTP status plus response body into a [`Failure`].
///
/// The body is inspected for provider-specific markers (content policy,
/// quota) but is never copied into the failure message verbatim beyond the
/// provider's error type tag.
pub fn classify_status(provider: &str, status: u16, body: &str) -> Failure {
    let kind = match status {
        429 => ErrorKind::RateLimited,
        408 | 504 => ErrorKind::Timeout,
        401 | 403 => ErrorKind::Auth,
        402 => ErrorKind::QuotaExhausted,
        400 | 422 => {
            if mentions_content_policy(body) {
                ErrorKind::ContentPolicy
            } else if mentions_quota(body) {
                ErrorKind::QuotaExhausted
            } else {
                ErrorKind::InvalidPayload
            }
        }
        500..=599 => ErrorKind::Network,
        _ => ErrorKind::Network,
    };

    Failure::new(
        kind,
        format!("{provider} API returned HTTP {status}{}", error_tag(body)),
    )
}

/// Classify a reqwest transport error.
pub fn classify_transport(provider: &str, err: &reqwest::Error) -> Failure {
    let kind = if err.is_timeout() {
        ErrorKind::Timeout
    } else {
        ErrorKind::Network
    };
    Failure::new(kind, format!("{provider} request failed: {err}"))
}

fn mentions_content_policy(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("content_policy")
        || lower.contains("content policy")
        || lower.contains("safety")
        || lower.contains("blocked")
}

fn mentions_quota(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("insufficient_quota") || lower.contains("billing")
}

/// Extract the provider's machine-readable error type tag, if any, without
/// copying free-form message text.
fn error_tag(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/type")
                .or_else(|| v.pointer("/error/code"))
                .or_else(|| v.pointer("/error/status"))
                .and_then(|t| t.as_str().map(|s| format!(" ({s})")))
        })
        .unwrap_or_default()
}
