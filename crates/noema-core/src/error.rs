// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Noema pipeline.
//!
//! Two layers live here. [`NoemaError`] is the infrastructure error used by
//! storage, transport, and configuration code. [`ErrorKind`] is the stable
//! failure taxonomy that drives retry and dead-letter decisions; every
//! failure that reaches the broker consumer is expressed as a [`Failure`]
//! carrying one of its kinds.

use std::time::Duration;

use thiserror::Error;

/// The primary error type for infrastructure operations.
#[derive(Debug, Error)]
pub enum NoemaError {
    /// Configuration errors (invalid TOML, unknown keys, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Broker errors (produce failure, consumer group problems).
    #[error("broker error: {message}")]
    Broker {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Fan-out bus errors (connection failure, publish failure).
    #[error("bus error: {message}")]
    Bus {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// LLM or embedding provider errors that are not stage failures.
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Stable taxonomy of pipeline failure kinds.
///
/// Transient kinds are retried by the layer that owns them and eventually
/// bubble up for broker redelivery; permanent kinds terminate the thought
/// and route the envelope to the dead-letter topic. The string forms are
/// part of the wire contract (`thought_failed.error_kind`) and must not
/// change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection errors, resets, broker transport failures.
    Network,
    /// An operation exceeded its configured deadline.
    Timeout,
    /// The provider asked us to slow down.
    RateLimited,
    /// Another delivery currently owns the thought row.
    InProgress,
    /// A stage produced invalid output and is being re-prompted.
    ValidationRetry,
    /// The thought references a user with no stored context.
    UnknownUser,
    /// The payload or stage output is invalid beyond repair.
    InvalidPayload,
    /// The provider rejected our credentials.
    Auth,
    /// The delivery retry budget ran out; the envelope was dead-lettered.
    RetriesExhausted,
    /// The provider reported quota exhaustion as terminal.
    QuotaExhausted,
    /// The provider refused the content.
    ContentPolicy,
    /// A sink invariant was violated (e.g. completing with missing stages).
    Invariant,
    /// The recovery sweeper gave up on a stuck thought.
    Stuck,
}

impl ErrorKind {
    /// Whether this kind is retried by redelivery.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::Network
                | ErrorKind::Timeout
                | ErrorKind::RateLimited
                | ErrorKind::InProgress
                | ErrorKind::ValidationRetry
        )
    }

    /// The stable wire form, e.g. `transient/timeout` or `permanent/stuck`.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Network => "transient/network",
            ErrorKind::Timeout => "transient/timeout",
            ErrorKind::RateLimited => "transient/rate_limited",
            ErrorKind::InProgress => "transient/in_progress",
            ErrorKind::ValidationRetry => "transient/validation_retry",
            ErrorKind::UnknownUser => "permanent/unknown_user",
            ErrorKind::InvalidPayload => "permanent/invalid_payload",
            ErrorKind::Auth => "permanent/auth",
            ErrorKind::RetriesExhausted => "permanent/retries_exhausted",
            ErrorKind::QuotaExhausted => "permanent/quota_exhausted",
            ErrorKind::ContentPolicy => "permanent/content_policy",
            ErrorKind::Invariant => "permanent/invariant",
            ErrorKind::Stuck => "permanent/stuck",
        }
    }

    /// Parse the wire form back into a kind.
    pub fn from_str_value(s: &str) -> Option<Self> {
        Some(match s {
            "transient/network" => ErrorKind::Network,
            "transient/timeout" => ErrorKind::Timeout,
            "transient/rate_limited" => ErrorKind::RateLimited,
            "transient/in_progress" => ErrorKind::InProgress,
            "transient/validation_retry" => ErrorKind::ValidationRetry,
            "permanent/unknown_user" => ErrorKind::UnknownUser,
            "permanent/invalid_payload" => ErrorKind::InvalidPayload,
            "permanent/auth" => ErrorKind::Auth,
            "permanent/retries_exhausted" => ErrorKind::RetriesExhausted,
            "permanent/quota_exhausted" => ErrorKind::QuotaExhausted,
            "permanent/content_policy" => ErrorKind::ContentPolicy,
            "permanent/invariant" => ErrorKind::Invariant,
            "permanent/stuck" => ErrorKind::Stuck,
            _ => return None,
        })
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure: a taxonomy kind plus a human-readable message.
///
/// The message is informational only and must never contain provider
/// response content.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

impl From<NoemaError> for Failure {
    /// Infrastructure errors surface as transient failures so the broker
    /// redelivers; the exception is timeouts, which keep their own kind.
    fn from(err: NoemaError) -> Self {
        match err {
            NoemaError::Timeout { duration } => Failure::new(
                ErrorKind::Timeout,
                format!("operation timed out after {duration:?}"),
            ),
            other => Failure::new(ErrorKind::Network, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_string_roundtrip() {
        let kinds = [
            ErrorKind::Network,
            ErrorKind::Timeout,
            ErrorKind::RateLimited,
            ErrorKind::InProgress,
            ErrorKind::ValidationRetry,
            ErrorKind::UnknownUser,
            ErrorKind::InvalidPayload,
            ErrorKind::Auth,
            ErrorKind::RetriesExhausted,
            ErrorKind::QuotaExhausted,
            ErrorKind::ContentPolicy,
            ErrorKind::Invariant,
            ErrorKind::Stuck,
        ];
        for kind in kinds {
            let parsed = ErrorKind::from_str_value(kind.as_str()).expect("should parse back");
            assert_eq!(kind, parsed);
        }
        assert!(ErrorKind::from_str_value("transient/unknown").is_none());
    }

    #[test]
    fn transient_prefix_matches_classification() {
        let kinds = [
            ErrorKind::Network,
            ErrorKind::Timeout,
            ErrorKind::RateLimited,
            ErrorKind::InProgress,
            ErrorKind::ValidationRetry,
            ErrorKind::UnknownUser,
            ErrorKind::InvalidPayload,
            ErrorKind::Auth,
            ErrorKind::RetriesExhausted,
            ErrorKind::QuotaExhausted,
            ErrorKind::ContentPolicy,
            ErrorKind::Invariant,
            ErrorKind::Stuck,
        ];
        for kind in kinds {
            assert_eq!(
                kind.is_transient(),
                kind.as_str().starts_with("transient/"),
                "classification and wire form disagree for {kind:?}"
            );
        }
    }

    #[test]
    fn infrastructure_errors_become_transient_failures() {
        let storage = NoemaError::Storage {
            source: Box::new(std::io::Error::other("disk gone")),
        };
        let failure: Failure = storage.into();
        assert!(failure.is_transient());
        assert_eq!(failure.kind, ErrorKind::Network);

        let timeout = NoemaError::Timeout {
            duration: Duration::from_secs(30),
        };
        let failure: Failure = timeout.into();
        assert_eq!(failure.kind, ErrorKind::Timeout);
    }

    #[test]
    fn failure_display_includes_kind() {
        let failure = Failure::new(ErrorKind::UnknownUser, "no context for user u1");
        let text = failure.to_string();
        assert!(text.contains("permanent/unknown_user"));
        assert!(text.contains("no context for user u1"));
    }
}
