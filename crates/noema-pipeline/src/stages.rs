// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The five agent stages: prompt construction, output parsing, and the
//! per-stage retry loop.
//!
//! Each stage is a pure function of the thought text, the user context, and
//! the prior stage outputs. Model output is parsed against the fixed stage
//! schema; a parse failure re-prompts the model with the parse error, up to
//! the configured internal retry budget, before becoming permanent.

use std::time::Duration;

use tracing::{debug, warn};

use noema_core::analysis::{StageName, ValueImpact};
use noema_core::types::{ChatMessage, ChatRequest, TokenUsage, UserContext};
use noema_core::{ErrorKind, Failure, ProviderAdapter};

/// Base instruction shared by all five stages.
const SYSTEM_PROMPT: &str = "You are an AI agent specialized in analyzing personal thoughts. \
Your role is to provide deep, contextual analysis based on the user's life circumstances, \
goals, constraints, and values. Always be honest, insightful, and actionable.";

/// Rough chars-per-token ratio used for context budgeting.
const CHARS_PER_TOKEN: usize = 4;

/// Tokens reserved for the system prompt, user context, instructions, and
/// the completion itself when budgeting prior-output sections.
const CONTEXT_RESERVE_TOKENS: u32 = 8_000;

/// Everything a stage may draw on.
pub struct StageInputs<'a> {
    pub thought_text: &'a str,
    pub user: &'a UserContext,
    pub classification: Option<&'a noema_core::analysis::Classification>,
    pub analysis: Option<&'a noema_core::analysis::Analysis>,
    pub value_impact: Option<&'a ValueImpact>,
    pub action_plan: Option<&'a noema_core::analysis::ActionPlan>,
}

/// A parsed, validated stage output.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    Classification(noema_core::analysis::Classification),
    Analysis(noema_core::analysis::Analysis),
    ValueImpact(ValueImpact),
    ActionPlan(noema_core::analysis::ActionPlan),
    Priority(noema_core::analysis::Priority),
}

impl StageOutput {
    pub fn stage(&self) -> StageName {
        match self {
            StageOutput::Classification(_) => StageName::Classification,
            StageOutput::Analysis(_) => StageName::Analysis,
            StageOutput::ValueImpact(_) => StageName::ValueImpact,
            StageOutput::ActionPlan(_) => StageName::ActionPlan,
            StageOutput::Priority(_) => StageName::Priority,
        }
    }

    /// JSON form for the sink.
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            StageOutput::Classification(v) => serde_json::to_value(v),
            StageOutput::Analysis(v) => serde_json::to_value(v),
            StageOutput::ValueImpact(v) => serde_json::to_value(v),
            StageOutput::ActionPlan(v) => serde_json::to_value(v),
            StageOutput::Priority(v) => serde_json::to_value(v),
        }
        .unwrap_or(serde_json::Value::Null)
    }
}

/// Runs one stage against the provider with internal retries.
pub struct StageRunner {
    provider: std::sync::Arc<dyn ProviderAdapter>,
    max_output_tokens: u32,
    internal_retries: u32,
    retry_base: Duration,
}

impl StageRunner {
    pub fn new(
        provider: std::sync::Arc<dyn ProviderAdapter>,
        max_output_tokens: u32,
        internal_retries: u32,
    ) -> Self {
        Self {
            provider,
            max_output_tokens,
            internal_retries,
            retry_base: Duration::from_millis(500),
        }
    }

    /// Shorten the internal backoff (tests).
    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    /// Execute one stage, retrying transient provider failures and invalid
    /// outputs up to the internal budget.
    pub async fn run_stage(
        &self,
        stage: StageName,
        inputs: &StageInputs<'_>,
    ) -> Result<(StageOutput, TokenUsage), Failure> {
        let mut usage = TokenUsage::default();
        let mut parse_error: Option<String> = None;
        let mut last_transient: Option<Failure> = None;

        for attempt in 0..=self.internal_retries {
            if attempt > 0 {
                let backoff = self.retry_base * 2u32.pow(attempt - 1);
                tokio::time::sleep(backoff).await;
            }

            let prompt = match &parse_error {
                None => stage_prompt(stage, inputs, self.prior_budget_tokens()),
                Some(error) => retry_prompt(stage, inputs, error, self.prior_budget_tokens()),
            };
            let request = ChatRequest {
                system: SYSTEM_PROMPT.to_string(),
                cacheable_context: Some(format!(
                    "USER CONTEXT:\n{}",
                    serde_json::to_string_pretty(&inputs.user.profile).unwrap_or_default()
                )),
                messages: vec![ChatMessage::user(prompt)],
                max_tokens: stage_max_tokens(stage).min(self.max_output_tokens),
            };

            let response = match self.provider.generate(request).await {
                Ok(response) => response,
                Err(failure) if failure.is_transient() => {
                    warn!(stage = %stage, attempt, error = %failure, "transient stage failure");
                    last_transient = Some(failure);
                    continue;
                }
                Err(failure) => return Err(failure),
            };
            usage.add(response.usage);

            match parse_stage(stage, &response.content) {
                Ok(mut output) => {
                    if let StageOutput::ValueImpact(vi) = &mut output {
                        vi.apply_weights(&inputs.user.values_ranking());
                    }
                    debug!(stage = %stage, attempt, "stage output accepted");
                    return Ok((output, usage));
                }
                Err(error) => {
                    warn!(stage = %stage, attempt, error = %error, "invalid stage output");
                    parse_error = Some(error);
                }
            }
        }

        match (parse_error, last_transient) {
            (Some(error), _) => Err(Failure::new(
                ErrorKind::InvalidPayload,
                format!("{stage} output invalid after retries: {error}"),
            )),
            (None, Some(failure)) => Err(failure),
            (None, None) => Err(Failure::new(
                ErrorKind::Network,
                format!("{stage} failed without a response"),
            )),
        }
    }

    fn prior_budget_tokens(&self) -> u32 {
        self.provider
            .capabilities()
            .max_context_tokens
            .saturating_sub(CONTEXT_RESERVE_TOKENS)
    }
}

/// Suggested completion budgets per stage.
fn stage_max_tokens(stage: StageName) -> u32 {
    match stage {
        StageName::Classification => 1000,
        StageName::Analysis => 1500,
        StageName::ValueImpact => 2000,
        StageName::ActionPlan => 2000,
        StageName::Priority => 1500,
    }
}

fn json_of<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

/// Join prior-output sections, dropping the OLDEST first when the provider
/// context window cannot hold them all.
fn assemble_sections(mut sections: Vec<(&'static str, String)>, budget_tokens: u32) -> String {
    let budget_chars = budget_tokens as usize * CHARS_PER_TOKEN;
    let total = |sections: &Vec<(&'static str, String)>| {
        sections
            .iter()
            .map(|(label, body)| label.len() + body.len() + 3)
            .sum::<usize>()
    };
    while sections.len() > 1 && total(&sections) > budget_chars {
        let (dropped, _) = sections.remove(0);
        warn!(section = dropped, "dropping oldest prior context to fit the window");
    }
    sections
        .iter()
        .map(|(label, body)| format!("{label}:\n{body}"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn stage_prompt(stage: StageName, inputs: &StageInputs<'_>, budget_tokens: u32) -> String {
    let thought = inputs.thought_text;
    match stage {
        StageName::Classification => format!(
            r#"Analyze this thought and extract structured information:

THOUGHT: "{thought}"

Return ONLY a valid JSON object with these exact fields (no additional text):
- type: (task/problem/idea/question/observation/emotion)
- urgency: (immediate/soon/eventually/never)
- entities: {{"people": [], "dates": [], "places": [], "topics": []}}
- emotional_tone: one word, e.g. excited/anxious/frustrated/neutral/curious
- implied_needs: [what the person might need]

Be specific and context-aware. Consider the user's background. RESPOND WITH ONLY JSON, NO MARKDOWN OR ADDITIONAL TEXT."#
        ),
        StageName::Analysis => {
            let priors = assemble_sections(
                vec![("CLASSIFICATION", inputs.classification.map(json_of).unwrap_or_default())],
                budget_tokens,
            );
            format!(
                r#"Provide deep contextual analysis of this thought:

THOUGHT: "{thought}"
{priors}

Return ONLY a valid JSON object with these exact fields (no markdown, no additional text):
- goal_alignment: {{"aligned_goals": [], "conflicting_goals": [], "reasoning": ""}}
- underlying_needs: [deeper needs beyond the surface thought]
- pattern_connections: [how this relates to the user's recent patterns]
- realistic_assessment: {{"feasibility": "", "given_constraints": "", "time_required": ""}}
- unspoken_factors: [important considerations the user may not have mentioned]

Be honest and consider the user's complete context. RESPOND WITH ONLY JSON."#
            )
        }
        StageName::ValueImpact => {
            let ranking = json_of(&inputs.user.profile.get("values_ranking"));
            let priors = assemble_sections(
                vec![
                    ("CLASSIFICATION", inputs.classification.map(json_of).unwrap_or_default()),
                    ("ANALYSIS", inputs.analysis.map(json_of).unwrap_or_default()),
                ],
                budget_tokens,
            );
            format!(
                r#"Assess the value impact of pursuing this thought:

THOUGHT: "{thought}"
{priors}

USER'S VALUES RANKING: {ranking}

Evaluate the impact on each dimension (0-10 scale). Return ONLY JSON:
{{
  "economic": {{"score": 0, "reasoning": ""}},
  "relational": {{"score": 0, "reasoning": ""}},
  "legacy": {{"score": 0, "reasoning": ""}},
  "health": {{"score": 0, "reasoning": ""}},
  "growth": {{"score": 0, "reasoning": ""}},
  "weighted_total": 0
}}

Scores must be numbers between 0 and 10. Be realistic about both positive and negative impacts."#
            )
        }
        StageName::ActionPlan => {
            let constraints = json_of(&inputs.user.constraints());
            let energy_peaks = format!("{:?}", inputs.user.energy_peaks());
            let priors = assemble_sections(
                vec![
                    ("ANALYSIS", inputs.analysis.map(json_of).unwrap_or_default()),
                    ("VALUE IMPACT", inputs.value_impact.map(json_of).unwrap_or_default()),
                ],
                budget_tokens,
            );
            format!(
                r#"Create a realistic action plan for this thought:

THOUGHT: "{thought}"
{priors}

USER CONSTRAINTS: {constraints}
ENERGY PEAKS: {energy_peaks}

Return ONLY JSON:
{{
  "quick_wins": [{{"action": "", "duration": "<30min", "timing": "", "outcome": ""}}],
  "main_actions": [{{"action": "", "duration": "", "prerequisites": [], "obstacles": [], "mitigation": "", "timing": "best time based on the user's energy patterns"}}],
  "delegation_opportunities": [{{"task": "", "who": "", "why": ""}}],
  "success_metrics": ["how to know it's working"]
}}

Be specific and actionable. Respect the user's time and energy constraints."#
            )
        }
        StageName::Priority => {
            let challenges = json_of(&inputs.user.current_challenges());
            let priors = assemble_sections(
                vec![
                    ("VALUE IMPACT", inputs.value_impact.map(json_of).unwrap_or_default()),
                    ("ACTION PLAN", inputs.action_plan.map(json_of).unwrap_or_default()),
                ],
                budget_tokens,
            );
            format!(
                r#"Determine the priority for this thought:

THOUGHT: "{thought}"
{priors}

CURRENT CHALLENGES: {challenges}

Return ONLY JSON:
{{
  "priority_level": "Critical/High/Medium/Low/Defer",
  "urgency_reasoning": "",
  "strategic_fit": "how this fits the user's goals",
  "recommended_timeline": {{"start": "", "duration": "", "checkpoints": []}},
  "final_recommendation": "clear next step"
}}

Critical: addresses an urgent challenge or high-value opportunity.
High: important for goals, start this week.
Medium: valuable, schedule within a month.
Low: nice to have, no rush.
Defer: not aligned with current priorities.

RESPOND WITH ONLY JSON, NO MARKDOWN OR ADDITIONAL TEXT."#
            )
        }
    }
}

fn retry_prompt(
    stage: StageName,
    inputs: &StageInputs<'_>,
    parse_error: &str,
    budget_tokens: u32,
) -> String {
    format!(
        "{}\n\nYour previous response could not be parsed: {parse_error}\n\
         Respond again with ONLY the JSON object, exactly matching the requested fields.",
        stage_prompt(stage, inputs, budget_tokens)
    )
}

/// Remove a markdown code fence around a JSON payload, if present.
pub fn strip_markdown_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

/// Parse and validate one stage's model output.
pub fn parse_stage(stage: StageName, raw: &str) -> Result<StageOutput, String> {
    let json = strip_markdown_fences(raw);
    let output = match stage {
        StageName::Classification => StageOutput::Classification(
            serde_json::from_str(json).map_err(|e| e.to_string())?,
        ),
        StageName::Analysis => {
            StageOutput::Analysis(serde_json::from_str(json).map_err(|e| e.to_string())?)
        }
        StageName::ValueImpact => {
            let vi: ValueImpact = serde_json::from_str(json).map_err(|e| e.to_string())?;
            vi.validate()?;
            StageOutput::ValueImpact(vi)
        }
        StageName::ActionPlan => {
            StageOutput::ActionPlan(serde_json::from_str(json).map_err(|e| e.to_string())?)
        }
        StageName::Priority => {
            StageOutput::Priority(serde_json::from_str(json).map_err(|e| e.to_string())?)
        }
    };
    Ok(output)
}
