// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the Noema workspace.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::analysis::{
    ActionPlan, Analysis, AnalysisResult, Classification, Priority, StageName, ValueDimension,
    ValueImpact,
};

/// Lifecycle status of a thought row.
///
/// Transitions are monotonic: `pending -> processing -> {completed, failed}`.
/// The recovery path may move `failed` back to `pending` while the attempt
/// counter is below budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThoughtStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ThoughtStatus {
    /// Convert to string for SQLite storage.
    pub fn as_str(self) -> &'static str {
        match self {
            ThoughtStatus::Pending => "pending",
            ThoughtStatus::Processing => "processing",
            ThoughtStatus::Completed => "completed",
            ThoughtStatus::Failed => "failed",
        }
    }

    /// Parse from SQLite string.
    pub fn from_str_value(s: &str) -> Self {
        match s {
            "processing" => ThoughtStatus::Processing,
            "completed" => ThoughtStatus::Completed,
            "failed" => ThoughtStatus::Failed,
            _ => ThoughtStatus::Pending,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ThoughtStatus::Completed | ThoughtStatus::Failed)
    }
}

/// Maximum accepted thought text length, in characters.
pub const MAX_THOUGHT_CHARS: usize = 4000;

/// The unit of work: one user-submitted text and its analysis state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thought {
    pub id: String,
    pub user_id: String,
    pub text: String,
    pub status: ThoughtStatus,
    /// How many times a consumer has begun processing this thought.
    pub attempts: i64,
    pub classification: Option<Classification>,
    pub analysis: Option<Analysis>,
    pub value_impact: Option<ValueImpact>,
    pub action_plan: Option<ActionPlan>,
    pub priority: Option<Priority>,
    /// Embedding of the original text; present after a successful run.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    /// User-context version the last run observed.
    pub context_version: Option<i64>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 terminal-transition timestamp.
    pub processed_at: Option<String>,
    /// ISO 8601 timestamp of the last `begin_processing`.
    pub processing_started_at: Option<String>,
}

impl Thought {
    /// Whether the named stage output has been persisted.
    pub fn has_stage(&self, stage: StageName) -> bool {
        match stage {
            StageName::Classification => self.classification.is_some(),
            StageName::Analysis => self.analysis.is_some(),
            StageName::ValueImpact => self.value_impact.is_some(),
            StageName::ActionPlan => self.action_plan.is_some(),
            StageName::Priority => self.priority.is_some(),
        }
    }

    /// The full analysis, if all five stages are present.
    pub fn analysis_result(&self) -> Option<AnalysisResult> {
        Some(AnalysisResult {
            classification: self.classification.clone()?,
            analysis: self.analysis.clone()?,
            value_impact: self.value_impact.clone()?,
            action_plan: self.action_plan.clone()?,
            priority: self.priority.clone()?,
        })
    }
}

/// A user's profile as consumed by the agents: an opaque, bounded JSON blob
/// with a monotonically increasing version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub version: i64,
    pub profile: serde_json::Value,
}

impl UserContext {
    /// The user's value-dimension weights, from `profile.values_ranking`.
    ///
    /// Unknown dimension names and non-numeric weights are ignored.
    pub fn values_ranking(&self) -> BTreeMap<ValueDimension, f64> {
        let mut weights = BTreeMap::new();
        let Some(ranking) = self.profile.get("values_ranking").and_then(|v| v.as_object()) else {
            return weights;
        };
        for dimension in ValueDimension::ALL {
            if let Some(weight) = ranking.get(dimension.as_str()).and_then(|v| v.as_f64()) {
                weights.insert(dimension, weight);
            }
        }
        weights
    }

    /// Time and energy constraints, for the action-planning stage.
    pub fn constraints(&self) -> serde_json::Value {
        self.profile
            .get("constraints")
            .cloned()
            .unwrap_or(serde_json::Value::Null)
    }

    /// Energy peaks from `profile.recent_patterns.energy_peaks`.
    pub fn energy_peaks(&self) -> Vec<String> {
        self.profile
            .pointer("/recent_patterns/energy_peaks")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Current challenges, for the prioritization stage.
    pub fn current_challenges(&self) -> serde_json::Value {
        self.profile
            .get("current_challenges")
            .cloned()
            .unwrap_or_else(|| serde_json::Value::Array(vec![]))
    }
}

// --- Provider types ---

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// A single message in a provider conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A request to an LLM provider.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Instruction portion of the system prompt.
    pub system: String,
    /// Portion of the system prompt the provider may cache across calls.
    /// Adapters without prompt-cache support fold it into `system`.
    pub cacheable_context: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
    #[serde(default)]
    pub cache_creation_tokens: u64,
}

impl TokenUsage {
    /// Accumulate another call's usage into this total.
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
        self.cache_creation_tokens += other.cache_creation_tokens;
    }
}

/// A full response from an LLM provider.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub usage: TokenUsage,
}

/// Capabilities reported by a provider adapter.
#[derive(Debug, Clone, Copy)]
pub struct ProviderCapabilities {
    pub supports_prompt_cache: bool,
    pub max_context_tokens: u32,
}

// --- Vector helpers ---

/// Convert an f32 vector to bytes for SQLite BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert a SQLite BLOB back to an f32 vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

/// Cosine similarity between two vectors.
///
/// Mismatched dimensions never match: the result is 0.0 rather than a panic,
/// so entries written under a different embedding configuration are skipped
/// instead of killing a lookup.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
