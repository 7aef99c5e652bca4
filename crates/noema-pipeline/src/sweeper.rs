// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recovery sweeper for stuck and stranded thoughts.
//!
//! Periodically scans a bounded batch of rows the pipeline lost track of:
//! `processing` rows whose owner died after `begin_processing` (the sole
//! safeguard for that crash window) and `pending` rows that never reached
//! the broker. Stuck rows below the delivery budget are republished;
//! exhausted ones are failed as stuck. When the producer is disabled the
//! sweeper drives recovered work orders through the handler directly — the
//! deferred-ingest batch path.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use noema_broker::{SubmitOutcome, ThoughtProducer, WorkHandler};
use noema_core::{ErrorKind, EventBody, EventEnvelope, ProgressBus, Thought};
use noema_storage::ThoughtStore;

/// Bounded scan size per cycle.
const SWEEP_BATCH: usize = 100;

/// Results of one sweep cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Work orders republished to the broker.
    pub republished: usize,
    /// Work orders driven through the fallback handler directly.
    pub recovered_inline: usize,
    /// Thoughts failed as permanently stuck.
    pub failed_stuck: usize,
}

/// Periodic recovery scanner.
pub struct Sweeper {
    sink: ThoughtStore,
    producer: Arc<ThoughtProducer>,
    bus: Arc<dyn ProgressBus>,
    /// Fallback when the producer is disabled: run recovered work inline.
    fallback: Option<Arc<dyn WorkHandler>>,
    interval: Duration,
    grace_seconds: u64,
    max_attempts: u32,
}

impl Sweeper {
    pub fn new(
        sink: ThoughtStore,
        producer: Arc<ThoughtProducer>,
        bus: Arc<dyn ProgressBus>,
        fallback: Option<Arc<dyn WorkHandler>>,
        interval: Duration,
        grace_seconds: u64,
        max_attempts: u32,
    ) -> Self {
        Self {
            sink,
            producer,
            bus,
            fallback,
            interval,
            grace_seconds,
            max_attempts,
        }
    }

    /// Scan on the configured interval until cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let report = self.sweep_once().await;
                    if report != SweepReport::default() {
                        info!(
                            republished = report.republished,
                            recovered_inline = report.recovered_inline,
                            failed_stuck = report.failed_stuck,
                            "sweep cycle finished"
                        );
                    }
                }
            }
        }
    }

    /// One bounded scan over stuck and stranded rows.
    pub async fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let stuck = match self.sink.stuck_processing(self.grace_seconds, SWEEP_BATCH).await {
            Ok(stuck) => stuck,
            Err(e) => {
                error!(error = %e, "stuck scan failed");
                return report;
            }
        };
        for thought in stuck {
            if thought.attempts >= i64::from(self.max_attempts) {
                self.fail_stuck(&thought, &mut report).await;
            } else {
                self.requeue(&thought, &mut report).await;
            }
        }

        let stranded = match self.sink.stale_pending(self.grace_seconds, SWEEP_BATCH).await {
            Ok(stranded) => stranded,
            Err(e) => {
                error!(error = %e, "pending scan failed");
                return report;
            }
        };
        for thought in stranded {
            self.requeue(&thought, &mut report).await;
        }

        report
    }

    async fn requeue(&self, thought: &Thought, report: &mut SweepReport) {
        let envelope = EventEnvelope::created(
            thought.id.clone(),
            thought.user_id.clone(),
            thought.text.clone(),
        );

        if self.producer.is_enabled() {
            match self.producer.publish(&envelope).await {
                Ok(SubmitOutcome::Published) => {
                    debug!(thought_id = %thought.id, attempts = thought.attempts, "republished");
                    report.republished += 1;
                }
                Ok(SubmitOutcome::Deferred) => {}
                Err(e) => warn!(error = %e, thought_id = %thought.id, "republish failed"),
            }
            return;
        }

        if let Some(handler) = &self.fallback {
            match handler.handle(&envelope).await {
                Ok(()) => {
                    debug!(thought_id = %thought.id, "recovered inline");
                    report.recovered_inline += 1;
                }
                Err(e) => warn!(error = %e, thought_id = %thought.id, "inline recovery failed"),
            }
        }
    }

    async fn fail_stuck(&self, thought: &Thought, report: &mut SweepReport) {
        let message = format!(
            "no terminal state after {} attempts; last processing began at {}",
            thought.attempts,
            thought.processing_started_at.as_deref().unwrap_or("unknown")
        );
        if let Err(e) = self.sink.fail(&thought.id, ErrorKind::Stuck, &message).await {
            error!(error = %e, thought_id = %thought.id, "failed to mark thought stuck");
            return;
        }
        let event = EventEnvelope::new(
            thought.id.clone(),
            thought.user_id.clone(),
            EventBody::ThoughtFailed {
                error_kind: ErrorKind::Stuck.as_str().to_string(),
                error_message: message,
                retry_count: thought.attempts.max(0) as u32,
            },
        );
        if let Err(e) = self.bus.publish(&thought.user_id, &event).await {
            warn!(error = %e, "failed to publish thought_failed for stuck thought");
        }
        warn!(thought_id = %thought.id, attempts = thought.attempts, "thought failed as stuck");
        report.failed_stuck += 1;
    }
}
