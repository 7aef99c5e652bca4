// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The pipeline orchestrator: one call runs one thought end to end.
//!
//! The orchestrator is stateless between calls; everything durable lives in
//! the sink. Within a call the five stages run strictly in sequence,
//! short-circuited by the semantic cache, with progress published to the
//! fan-out bus after each step.
//!
//! Failure discipline: transient failures release row ownership by marking
//! it `failed` with the transient kind, so the broker's redelivery can
//! reclaim it through the `failed -> processing` compare-and-set without
//! waiting out the stuck-grace window. Permanent failures additionally
//! publish `thought_failed`; the consumer owns the dead-letter publish.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use noema_broker::WorkHandler;
use noema_cache::{CacheHit, SemanticCache};
use noema_core::analysis::StageName;
use noema_core::types::TokenUsage;
use noema_core::{
    ErrorKind, EventBody, EventEnvelope, Failure, ProgressBus, Thought, ThoughtStatus, UserContext,
};
use noema_storage::{BeginOutcome, CompleteOutcome, ThoughtStore, UserStore};

use crate::stages::{StageInputs, StageOutput, StageRunner};

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub cache_hit: bool,
    pub processing_time_seconds: f64,
    pub usage: TokenUsage,
}

impl RunReport {
    /// Report for idempotent no-op redeliveries.
    fn noop() -> Self {
        Self {
            cache_hit: false,
            processing_time_seconds: 0.0,
            usage: TokenUsage::default(),
        }
    }
}

/// Runs thoughts through the five-agent pipeline.
pub struct Orchestrator {
    sink: ThoughtStore,
    users: UserStore,
    cache: Arc<SemanticCache>,
    runner: StageRunner,
    bus: Arc<dyn ProgressBus>,
    grace_seconds: u64,
}

impl Orchestrator {
    pub fn new(
        sink: ThoughtStore,
        users: UserStore,
        cache: Arc<SemanticCache>,
        runner: StageRunner,
        bus: Arc<dyn ProgressBus>,
        grace_seconds: u64,
    ) -> Self {
        Self {
            sink,
            users,
            cache,
            runner,
            bus,
            grace_seconds,
        }
    }

    /// Run one thought to a terminal state (or bubble a classified failure).
    pub async fn run(&self, thought_id: &str) -> Result<RunReport, Failure> {
        let started = Instant::now();

        // Idempotent redelivery: a thought that already reached a real
        // terminal state is a no-op. A `failed` row with a transient kind
        // is a released retry, not terminal; one with a permanent kind
        // (including a dead-lettered retry budget) stays terminal even if
        // the envelope is replayed.
        let thought = self
            .sink
            .get(thought_id)
            .await
            .map_err(Failure::from)?
            .ok_or_else(|| {
                Failure::new(ErrorKind::InvalidPayload, format!("unknown thought {thought_id}"))
            })?;

        match thought.status {
            ThoughtStatus::Completed => return Ok(RunReport::noop()),
            ThoughtStatus::Failed => {
                let permanent = thought
                    .error_kind
                    .as_deref()
                    .and_then(ErrorKind::from_str_value)
                    .map(|kind| !kind.is_transient())
                    .unwrap_or(true);
                if permanent {
                    return Ok(RunReport::noop());
                }
            }
            ThoughtStatus::Pending | ThoughtStatus::Processing => {}
        }

        // Take ownership.
        let attempts = match self
            .sink
            .begin_processing(thought_id, self.grace_seconds)
            .await
            .map_err(Failure::from)?
        {
            BeginOutcome::Started { attempts } => attempts,
            BeginOutcome::Busy => {
                return Err(Failure::new(
                    ErrorKind::InProgress,
                    format!("thought {thought_id} is owned by another delivery"),
                ));
            }
            BeginOutcome::AlreadyCompleted | BeginOutcome::AlreadyFailed => {
                return Ok(RunReport::noop())
            }
            BeginOutcome::NotFound => {
                return Err(Failure::new(
                    ErrorKind::InvalidPayload,
                    format!("thought {thought_id} disappeared"),
                ));
            }
        };

        self.publish(&thought.user_id, EventBody::ThoughtProcessing, &thought.id)
            .await;

        // User context is mandatory.
        let user = match self.users.get(&thought.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                let failure = Failure::new(
                    ErrorKind::UnknownUser,
                    format!("no context stored for user {}", thought.user_id),
                );
                return Err(self.settle_failure(&thought, failure, attempts).await);
            }
            Err(e) => {
                return Err(self.settle_failure(&thought, Failure::from(e), attempts).await)
            }
        };

        // Cache check; every error below degrades to a miss.
        let embedding = self.cache.embed(&thought.text).await;
        if let Some(embedding) = &embedding {
            if let Some(hit) = self.cache.lookup(&thought.user_id, embedding).await {
                return self
                    .finish_from_cache(&thought, &user, hit, embedding, started, attempts)
                    .await;
            }
        }

        self.run_stages(thought, &user, embedding, started, attempts)
            .await
    }

    async fn run_stages(
        &self,
        mut thought: Thought,
        user: &UserContext,
        embedding: Option<Vec<f32>>,
        started: Instant,
        attempts: i64,
    ) -> Result<RunReport, Failure> {
        let mut usage = TokenUsage::default();

        for stage in StageName::ALL {
            // A partial row from an earlier delivery resumes where it
            // stopped; events for finished stages went out back then.
            if thought.has_stage(stage) {
                debug!(thought_id = %thought.id, stage = %stage, "stage already persisted; resuming");
                continue;
            }

            let inputs = StageInputs {
                thought_text: &thought.text,
                user,
                classification: thought.classification.as_ref(),
                analysis: thought.analysis.as_ref(),
                value_impact: thought.value_impact.as_ref(),
                action_plan: thought.action_plan.as_ref(),
            };

            let (output, stage_usage) = match self.runner.run_stage(stage, &inputs).await {
                Ok(done) => done,
                Err(failure) => return Err(self.settle_failure(&thought, failure, attempts).await),
            };
            usage.add(stage_usage);

            let wrote = match self
                .sink
                .write_stage(&thought.id, stage, &output.to_value())
                .await
            {
                Ok(wrote) => wrote,
                Err(e) => {
                    return Err(self.settle_failure(&thought, Failure::from(e), attempts).await)
                }
            };

            if wrote {
                apply_output(&mut thought, output);
            } else {
                // Lost the first-writer race: the persisted value wins.
                match self.sink.get(&thought.id).await {
                    Ok(Some(fresh)) => thought = fresh,
                    Ok(None) | Err(_) => apply_output(&mut thought, output),
                }
            }

            self.publish_agent_completed(&thought, stage).await;
        }

        let Some(result) = thought.analysis_result() else {
            let failure = Failure::new(
                ErrorKind::Invariant,
                "pipeline finished with a missing stage output",
            );
            return Err(self.settle_failure(&thought, failure, attempts).await);
        };

        if let Some(embedding) = &embedding {
            self.cache
                .save(&thought.user_id, &thought.text, embedding, &result)
                .await;
        }

        self.finish(&thought, embedding.as_deref(), Some(user.version), false, started, attempts, usage)
            .await
    }

    async fn finish_from_cache(
        &self,
        thought: &Thought,
        user: &UserContext,
        hit: CacheHit,
        embedding: &[f32],
        started: Instant,
        attempts: i64,
    ) -> Result<RunReport, Failure> {
        info!(
            thought_id = %thought.id,
            similarity = hit.similarity,
            "semantic cache hit; skipping the agent pipeline"
        );
        let outputs = [
            (StageName::Classification, serde_json::to_value(&hit.outputs.classification)),
            (StageName::Analysis, serde_json::to_value(&hit.outputs.analysis)),
            (StageName::ValueImpact, serde_json::to_value(&hit.outputs.value_impact)),
            (StageName::ActionPlan, serde_json::to_value(&hit.outputs.action_plan)),
            (StageName::Priority, serde_json::to_value(&hit.outputs.priority)),
        ];
        for (stage, value) in outputs {
            let value = value.unwrap_or(serde_json::Value::Null);
            if let Err(e) = self.sink.write_stage(&thought.id, stage, &value).await {
                return Err(self.settle_failure(thought, Failure::from(e), attempts).await);
            }
        }

        self.finish(thought, Some(embedding), Some(user.version), true, started, attempts, TokenUsage::default())
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        thought: &Thought,
        embedding: Option<&[f32]>,
        context_version: Option<i64>,
        cache_hit: bool,
        started: Instant,
        attempts: i64,
        usage: TokenUsage,
    ) -> Result<RunReport, Failure> {
        let outcome = match self.sink.complete(&thought.id, embedding, context_version).await {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.settle_failure(thought, Failure::from(e), attempts).await),
        };

        match outcome {
            CompleteOutcome::Completed | CompleteOutcome::AlreadyCompleted => {
                let processing_time_seconds = started.elapsed().as_secs_f64();
                self.publish(
                    &thought.user_id,
                    EventBody::ThoughtCompleted {
                        processing_time_seconds,
                        cache_hit,
                    },
                    &thought.id,
                )
                .await;
                info!(
                    thought_id = %thought.id,
                    cache_hit,
                    elapsed_s = processing_time_seconds,
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "thought completed"
                );
                Ok(RunReport {
                    cache_hit,
                    processing_time_seconds,
                    usage,
                })
            }
            CompleteOutcome::MissingStages => {
                let failure = Failure::new(
                    ErrorKind::Invariant,
                    "completion attempted with missing stage outputs",
                );
                Err(self.settle_failure(thought, failure, attempts).await)
            }
            CompleteOutcome::NotFound => Err(Failure::new(
                ErrorKind::InvalidPayload,
                format!("thought {} disappeared before completion", thought.id),
            )),
        }
    }

    /// Record a failure on the row and, for permanent kinds, publish the
    /// terminal event. Returns the failure for bubbling.
    async fn settle_failure(&self, thought: &Thought, failure: Failure, attempts: i64) -> Failure {
        if let Err(e) = self
            .sink
            .fail(&thought.id, failure.kind, &failure.message)
            .await
        {
            warn!(error = %e, thought_id = %thought.id, "failed to record failure on sink");
        }

        if !failure.is_transient() {
            self.publish(
                &thought.user_id,
                EventBody::ThoughtFailed {
                    error_kind: failure.kind.as_str().to_string(),
                    error_message: failure.message.clone(),
                    retry_count: attempts.max(0) as u32,
                },
                &thought.id,
            )
            .await;
        }
        failure
    }

    async fn publish_agent_completed(&self, thought: &Thought, stage: StageName) {
        let event = EventEnvelope::agent_completed(
            thought.id.clone(),
            thought.user_id.clone(),
            stage.as_str(),
            stage.number(),
        );
        if let Err(e) = self.bus.publish(&thought.user_id, &event).await {
            warn!(error = %e, "progress publish failed");
        }
    }

    async fn publish(&self, user_id: &str, body: EventBody, thought_id: &str) {
        let event = EventEnvelope::new(thought_id, user_id, body);
        if let Err(e) = self.bus.publish(user_id, &event).await {
            warn!(error = %e, "progress publish failed");
        }
    }
}

fn apply_output(thought: &mut Thought, output: StageOutput) {
    match output {
        StageOutput::Classification(v) => thought.classification = Some(v),
        StageOutput::Analysis(v) => thought.analysis = Some(v),
        StageOutput::ValueImpact(v) => thought.value_impact = Some(v),
        StageOutput::ActionPlan(v) => thought.action_plan = Some(v),
        StageOutput::Priority(v) => thought.priority = Some(v),
    }
}

#[async_trait]
impl WorkHandler for Orchestrator {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), Failure> {
        self.run(&envelope.thought_id).await.map(|report| {
            debug!(
                thought_id = %envelope.thought_id,
                cache_hit = report.cache_hit,
                "work order settled"
            );
        })
    }
}
