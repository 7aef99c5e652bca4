// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed schemas for the five agent stage outputs.
//!
//! Model responses are deserialized into these types at the stage boundary;
//! everything downstream (sink, cache, fan-out) operates on the parsed form
//! only. Unknown extra fields from the model are tolerated; missing optional
//! lists default to empty. Parse failure is the validation failure that
//! triggers a stage re-prompt.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The five pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageName {
    Classification,
    Analysis,
    ValueImpact,
    ActionPlan,
    Priority,
}

impl StageName {
    /// All stages in execution order.
    pub const ALL: [StageName; 5] = [
        StageName::Classification,
        StageName::Analysis,
        StageName::ValueImpact,
        StageName::ActionPlan,
        StageName::Priority,
    ];

    /// Stable name; doubles as the sink column and the `agent_name` on
    /// progress events.
    pub fn as_str(self) -> &'static str {
        match self {
            StageName::Classification => "classification",
            StageName::Analysis => "analysis",
            StageName::ValueImpact => "value_impact",
            StageName::ActionPlan => "action_plan",
            StageName::Priority => "priority",
        }
    }

    /// 1-based position in the pipeline.
    pub fn number(self) -> u8 {
        match self {
            StageName::Classification => 1,
            StageName::Analysis => 2,
            StageName::ValueImpact => 3,
            StageName::ActionPlan => 4,
            StageName::Priority => 5,
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- A1: classification ---

/// What kind of thought this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThoughtKind {
    Task,
    Problem,
    Idea,
    Question,
    Observation,
    Emotion,
}

/// How soon the thought demands attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    Immediate,
    Soon,
    Eventually,
    Never,
}

/// Named entities extracted from the thought text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entities {
    #[serde(default)]
    pub people: Vec<String>,
    #[serde(default)]
    pub dates: Vec<String>,
    #[serde(default)]
    pub places: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

/// Output of agent 1: classification and extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(rename = "type")]
    pub kind: ThoughtKind,
    pub urgency: UrgencyLevel,
    #[serde(default)]
    pub entities: Entities,
    #[serde(default)]
    pub emotional_tone: String,
    #[serde(default)]
    pub implied_needs: Vec<String>,
}

// --- A2: contextual analysis ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalAlignment {
    #[serde(default)]
    pub aligned_goals: Vec<String>,
    #[serde(default)]
    pub conflicting_goals: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealisticAssessment {
    #[serde(default)]
    pub feasibility: String,
    #[serde(default)]
    pub given_constraints: String,
    #[serde(default)]
    pub time_required: String,
}

/// Output of agent 2: deep contextual analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub goal_alignment: GoalAlignment,
    #[serde(default)]
    pub underlying_needs: Vec<String>,
    #[serde(default)]
    pub pattern_connections: Vec<String>,
    #[serde(default)]
    pub realistic_assessment: RealisticAssessment,
    #[serde(default)]
    pub unspoken_factors: Vec<String>,
}

// --- A3: value impact ---

/// The five value dimensions, in tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueDimension {
    Economic,
    Relational,
    Legacy,
    Health,
    Growth,
}

impl ValueDimension {
    /// Fixed order used both for iteration and for breaking score ties.
    pub const ALL: [ValueDimension; 5] = [
        ValueDimension::Economic,
        ValueDimension::Relational,
        ValueDimension::Legacy,
        ValueDimension::Health,
        ValueDimension::Growth,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ValueDimension::Economic => "economic",
            ValueDimension::Relational => "relational",
            ValueDimension::Legacy => "legacy",
            ValueDimension::Health => "health",
            ValueDimension::Growth => "growth",
        }
    }
}

/// One dimension's score with its justification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueScore {
    pub score: f64,
    #[serde(default)]
    pub reasoning: String,
}

/// Output of agent 3: impact scores across the five value dimensions.
///
/// `weighted_total` is recomputed by the pipeline from the user's values
/// ranking rather than trusted from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueImpact {
    pub economic: ValueScore,
    pub relational: ValueScore,
    pub legacy: ValueScore,
    pub health: ValueScore,
    pub growth: ValueScore,
    #[serde(default)]
    pub weighted_total: f64,
}

impl ValueImpact {
    pub fn score(&self, dimension: ValueDimension) -> &ValueScore {
        match dimension {
            ValueDimension::Economic => &self.economic,
            ValueDimension::Relational => &self.relational,
            ValueDimension::Legacy => &self.legacy,
            ValueDimension::Health => &self.health,
            ValueDimension::Growth => &self.growth,
        }
    }

    /// Check every score is a finite number in [0, 10].
    pub fn validate(&self) -> Result<(), String> {
        for dimension in ValueDimension::ALL {
            let score = self.score(dimension).score;
            if !score.is_finite() || !(0.0..=10.0).contains(&score) {
                return Err(format!(
                    "{} score {score} is outside [0, 10]",
                    dimension.as_str()
                ));
            }
        }
        Ok(())
    }

    /// Recompute `weighted_total` from the user's values ranking.
    ///
    /// Dimensions absent from the ranking weigh zero; an all-zero (or empty)
    /// ranking falls back to equal weights.
    pub fn apply_weights(&mut self, weights: &BTreeMap<ValueDimension, f64>) {
        let total_weight: f64 = ValueDimension::ALL
            .iter()
            .map(|d| weights.get(d).copied().unwrap_or(0.0))
            .sum();

        self.weighted_total = if total_weight > 0.0 {
            ValueDimension::ALL
                .iter()
                .map(|d| self.score(*d).score * weights.get(d).copied().unwrap_or(0.0))
                .sum::<f64>()
                / total_weight
        } else {
            ValueDimension::ALL
                .iter()
                .map(|d| self.score(*d).score)
                .sum::<f64>()
                / ValueDimension::ALL.len() as f64
        };
    }

    /// The highest-scoring dimension; ties break in [`ValueDimension::ALL`]
    /// order.
    pub fn dominant(&self) -> ValueDimension {
        let mut best = ValueDimension::Economic;
        for dimension in ValueDimension::ALL {
            if self.score(dimension).score > self.score(best).score {
                best = dimension;
            }
        }
        best
    }
}

// --- A4: action plan ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuickWin {
    pub action: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub timing: String,
    #[serde(default)]
    pub outcome: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MainAction {
    pub action: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub obstacles: Vec<String>,
    #[serde(default)]
    pub mitigation: String,
    /// Timing hint drawn from the user's energy and time constraints.
    #[serde(default)]
    pub timing: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DelegationOpportunity {
    pub task: String,
    #[serde(default)]
    pub who: String,
    #[serde(default)]
    pub why: String,
}

/// Output of agent 4: the action plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    #[serde(default)]
    pub quick_wins: Vec<QuickWin>,
    pub main_actions: Vec<MainAction>,
    #[serde(default)]
    pub delegation_opportunities: Vec<DelegationOpportunity>,
    #[serde(default)]
    pub success_metrics: Vec<String>,
}

// --- A5: prioritization ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriorityLevel {
    Critical,
    High,
    Medium,
    Low,
    Defer,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendedTimeline {
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub checkpoints: Vec<String>,
}

/// Output of agent 5: priority and timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Priority {
    pub priority_level: PriorityLevel,
    #[serde(default)]
    pub urgency_reasoning: String,
    #[serde(default)]
    pub strategic_fit: String,
    #[serde(default)]
    pub recommended_timeline: RecommendedTimeline,
    #[serde(default)]
    pub final_recommendation: String,
}

// --- Full pipeline output ---

/// The complete five-stage analysis; the semantic cache payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub classification: Classification,
    pub analysis: Analysis,
    pub value_impact: ValueImpact,
    pub action_plan: ActionPlan,
    pub priority: Priority,
}
