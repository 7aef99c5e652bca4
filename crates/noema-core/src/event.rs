// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event envelope and canonical JSON codec.
//!
//! The same envelope travels on the broker work topic, the dead-letter
//! topic, and the fan-out bus; there is no schema translation between
//! transports. Variant payloads are internally tagged on `event_type` and
//! flattened into the envelope, so the wire form is a single flat object:
//!
//! ```json
//! {
//!   "event_id": "…",
//!   "event_type": "thought_agent_completed",
//!   "schema_version": 1,
//!   "occurred_at": "2026-01-01T00:00:00Z",
//!   "thought_id": "…",
//!   "user_id": "…",
//!   "agent_name": "classification",
//!   "agent_number": 1,
//!   "total_agents": 5,
//!   "progress_percent": 20
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NoemaError;

/// The envelope schema version this build reads and writes.
pub const SCHEMA_VERSION: u32 = 1;

/// Number of agents in the pipeline; fixed by the analysis contract.
pub const TOTAL_AGENTS: u8 = 5;

/// A versioned event describing one step of a thought's lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique id of this event instance.
    pub event_id: String,
    /// Envelope schema version; unrecognized versions are dead-lettered.
    pub schema_version: u32,
    /// When the event occurred (RFC3339).
    pub occurred_at: DateTime<Utc>,
    /// The thought this event concerns.
    pub thought_id: String,
    /// The user owning the thought; also the broker partition key.
    pub user_id: String,
    /// Variant payload, tagged on `event_type`.
    #[serde(flatten)]
    pub body: EventBody,
}

/// Variant payloads for the thought lifecycle events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventBody {
    /// A new thought was accepted and enqueued for processing.
    ThoughtCreated {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        priority_hint: Option<String>,
    },
    /// The pipeline took ownership of the thought.
    ThoughtProcessing,
    /// One agent stage finished.
    ThoughtAgentCompleted {
        agent_name: String,
        agent_number: u8,
        total_agents: u8,
        progress_percent: u8,
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_output: Option<serde_json::Value>,
    },
    /// The pipeline finished successfully.
    ThoughtCompleted {
        processing_time_seconds: f64,
        cache_hit: bool,
    },
    /// The pipeline gave up on the thought.
    ThoughtFailed {
        error_kind: String,
        error_message: String,
        retry_count: u32,
    },
}

impl EventBody {
    /// The wire tag for this variant.
    pub fn event_type(&self) -> &'static str {
        match self {
            EventBody::ThoughtCreated { .. } => "thought_created",
            EventBody::ThoughtProcessing => "thought_processing",
            EventBody::ThoughtAgentCompleted { .. } => "thought_agent_completed",
            EventBody::ThoughtCompleted { .. } => "thought_completed",
            EventBody::ThoughtFailed { .. } => "thought_failed",
        }
    }
}

impl EventEnvelope {
    /// Build a new envelope with a fresh event id and the current time.
    pub fn new(thought_id: impl Into<String>, user_id: impl Into<String>, body: EventBody) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            schema_version: SCHEMA_VERSION,
            occurred_at: Utc::now(),
            thought_id: thought_id.into(),
            user_id: user_id.into(),
            body,
        }
    }

    /// Convenience constructor for the work-order event.
    pub fn created(
        thought_id: impl Into<String>,
        user_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::new(
            thought_id,
            user_id,
            EventBody::ThoughtCreated {
                text: text.into(),
                priority_hint: None,
            },
        )
    }

    /// Convenience constructor for per-stage progress.
    pub fn agent_completed(
        thought_id: impl Into<String>,
        user_id: impl Into<String>,
        agent_name: impl Into<String>,
        agent_number: u8,
    ) -> Self {
        let progress_percent = (u16::from(agent_number) * 100 / u16::from(TOTAL_AGENTS)) as u8;
        Self::new(
            thought_id,
            user_id,
            EventBody::ThoughtAgentCompleted {
                agent_name: agent_name.into(),
                agent_number,
                total_agents: TOTAL_AGENTS,
                progress_percent,
                agent_output: None,
            },
        )
    }

    /// Serialize to the canonical JSON wire form.
    pub fn to_json(&self) -> Result<String, NoemaError> {
        serde_json::to_string(self).map_err(|e| NoemaError::Internal(format!(
            "failed to serialize event envelope: {e}"
        )))
    }

    /// Parse an envelope from its JSON wire form.
    ///
    /// Does not reject unknown schema versions; callers that care use
    /// [`EventEnvelope::is_supported_version`] and dead-letter mismatches.
    pub fn from_json(json: &str) -> Result<Self, NoemaError> {
        serde_json::from_str(json).map_err(|e| NoemaError::Internal(format!(
            "failed to parse event envelope: {e}"
        )))
    }

    /// Whether this build knows how to process the envelope.
    pub fn is_supported_version(&self) -> bool {
        self.schema_version == SCHEMA_VERSION
    }
}

/// A dead-lettered envelope: the original record plus the reason it failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    #[serde(flatten)]
    pub envelope: EventEnvelope,
    pub failure_reason: String,
}

impl DeadLetterRecord {
    pub fn new(envelope: EventEnvelope, failure_reason: impl Into<String>) -> Self {
        Self {
            envelope,
            failure_reason: failure_reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_event_wire_form() {
        let event = EventEnvelope::created("t-1", "u-1", "Should I learn Rust?");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event_type"], "thought_created");
        assert_eq!(json["schema_version"], 1);
        assert_eq!(json["thought_id"], "t-1");
        assert_eq!(json["user_id"], "u-1");
        assert_eq!(json["text"], "Should I learn Rust?");
        assert!(json.get("priority_hint").is_none());
        assert!(!json["event_id"].as_str().unwrap().is_empty());
        assert!(json["occurred_at"].is_string());
    }

    #[test]
    fn processing_event_has_no_variant_fields() {
        let event = EventEnvelope::new("t-1", "u-1", EventBody::ThoughtProcessing);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "thought_processing");
        assert!(json.get("text").is_none());
        assert!(json.get("error_kind").is_none());
    }

    #[test]
    fn agent_completed_progress_percent() {
        for (number, expected) in [(1u8, 20u8), (2, 40), (3, 60), (4, 80), (5, 100)] {
            let event = EventEnvelope::agent_completed("t-1", "u-1", "analysis", number);
            match event.body {
                EventBody::ThoughtAgentCompleted {
                    agent_number,
                    total_agents,
                    progress_percent,
                    ..
                } => {
                    assert_eq!(agent_number, number);
                    assert_eq!(total_agents, 5);
                    assert_eq!(progress_percent, expected);
                }
                _ => panic!("expected ThoughtAgentCompleted"),
            }
        }
    }

    #[test]
    fn json_roundtrip_all_variants() {
        let variants = vec![
            EventBody::ThoughtCreated {
                text: "min".into(),
                priority_hint: Some("high".into()),
            },
            EventBody::ThoughtProcessing,
            EventBody::ThoughtAgentCompleted {
                agent_name: "value_impact".into(),
                agent_number: 3,
                total_agents: 5,
                progress_percent: 60,
                agent_output: None,
            },
            EventBody::ThoughtCompleted {
                processing_time_seconds: 12.5,
                cache_hit: true,
            },
            EventBody::ThoughtFailed {
                error_kind: "permanent/unknown_user".into(),
                error_message: "no context".into(),
                retry_count: 3,
            },
        ];

        for body in variants {
            let event = EventEnvelope::new("t-9", "u-9", body);
            let json = event.to_json().unwrap();
            let parsed = EventEnvelope::from_json(&json).unwrap();
            assert_eq!(event, parsed);
            assert!(parsed.is_supported_version());
        }
    }

    #[test]
    fn unknown_schema_version_is_parseable_but_unsupported() {
        let mut event = EventEnvelope::created("t-1", "u-1", "text");
        event.schema_version = 99;
        let json = event.to_json().unwrap();
        let parsed = EventEnvelope::from_json(&json).unwrap();
        assert!(!parsed.is_supported_version());
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(EventEnvelope::from_json("{not json").is_err());
        assert!(EventEnvelope::from_json(r#"{"event_type":"nope"}"#).is_err());
    }

    #[test]
    fn dead_letter_record_keeps_original_fields() {
        let event = EventEnvelope::created("t-1", "u-1", "text");
        let record = DeadLetterRecord::new(event.clone(), "max retries exceeded");
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["event_type"], "thought_created");
        assert_eq!(json["thought_id"], "t-1");
        assert_eq!(json["failure_reason"], "max retries exceeded");

        let parsed: DeadLetterRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.envelope, event);
    }
}
