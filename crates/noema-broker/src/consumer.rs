// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Consumer-group worker for the thought work topic.
//!
//! Offsets are committed manually and only after the sink has acknowledged
//! the work; a crash between orchestrator completion and commit re-drives
//! the delivery, and sink idempotency makes the replay a no-op. Transient
//! failures seek the partition back so the broker redelivers; permanent
//! failures and exhausted budgets go to the dead-letter topic. A
//! dead-lettered row is stamped with the permanent `retries_exhausted`
//! kind so that a replay of the same envelope (lost or failed commit) is
//! itself a no-op rather than a fresh pipeline run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::Offset;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use noema_config::model::{BrokerConfig, PipelineConfig};
use noema_core::{
    DeadLetterRecord, ErrorKind, EventBody, EventEnvelope, Failure, NoemaError, ProgressBus,
};
use noema_storage::ThoughtStore;

use crate::producer::ThoughtProducer;

/// Session timeout must exceed P99 pipeline latency or long-running work
/// triggers partition rebalances.
const SESSION_TIMEOUT: Duration = Duration::from_secs(45);
/// Ceiling on the gap between polls while a pipeline run is in flight.
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(600);
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// The work a consumer dispatches: one `ThoughtCreated` envelope.
#[async_trait]
pub trait WorkHandler: Send + Sync {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), Failure>;
}

/// What to do with a delivery after the handler ran.
#[derive(Debug, PartialEq, Eq)]
enum Disposition {
    Commit,
    /// Seek back and let the broker redeliver after the backoff.
    Retry { backoff: Duration },
    /// Terminal: dead-letter, then commit.
    DeadLetter {
        reason: String,
        /// Whether the consumer still owes the sink/bus the failure
        /// bookkeeping (the orchestrator already did it for permanent
        /// stage failures).
        record_failure: bool,
        kind: ErrorKind,
    },
}

/// Consumer-group worker.
pub struct ThoughtConsumer {
    consumer: StreamConsumer,
    producer: Arc<ThoughtProducer>,
    bus: Arc<dyn ProgressBus>,
    sink: ThoughtStore,
    max_deliveries: u32,
    retry_backoff: Duration,
}

impl ThoughtConsumer {
    pub fn new(
        broker: &BrokerConfig,
        pipeline: &PipelineConfig,
        producer: Arc<ThoughtProducer>,
        bus: Arc<dyn ProgressBus>,
        sink: ThoughtStore,
    ) -> Result<Self, NoemaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &broker.bootstrap_servers)
            .set("group.id", &broker.consumer_group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", SESSION_TIMEOUT.as_millis().to_string())
            .set(
                "max.poll.interval.ms",
                MAX_POLL_INTERVAL.as_millis().to_string(),
            )
            .set("queued.min.messages", broker.batch_size.max(1).to_string())
            .create()
            .map_err(|e| NoemaError::Broker {
                message: format!("failed to create consumer: {e}"),
                source: Some(Box::new(e)),
            })?;

        consumer
            .subscribe(&[broker.work_topic.as_str()])
            .map_err(|e| NoemaError::Broker {
                message: format!("failed to subscribe to {}: {e}", broker.work_topic),
                source: Some(Box::new(e)),
            })?;

        info!(
            group = %broker.consumer_group,
            topic = %broker.work_topic,
            "consumer subscribed"
        );

        Ok(Self {
            consumer,
            producer,
            bus,
            sink,
            max_deliveries: pipeline.pipeline_max_attempts.max(1),
            retry_backoff: Duration::from_millis(broker.retry_backoff_ms.max(1)),
        })
    }

    /// Poll-dispatch-commit loop until the token cancels.
    ///
    /// Cancellation is observed between messages, so an in-flight pipeline
    /// run always completes (or is force-aborted by the caller's drain
    /// deadline) before the loop exits.
    pub async fn run(
        &self,
        handler: Arc<dyn WorkHandler>,
        shutdown: CancellationToken,
    ) -> Result<(), NoemaError> {
        // Per-thought delivery ledger, as redeliveries arrive on the same
        // consumer; cleared on any terminal disposition.
        let mut deliveries: HashMap<String, u32> = HashMap::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown requested; consumer stopped polling");
                    return Ok(());
                }
                received = self.consumer.recv() => {
                    match received {
                        Ok(message) => {
                            self.process_message(&message, handler.as_ref(), &mut deliveries)
                                .await;
                        }
                        Err(e) => {
                            warn!(error = %e, "poll failed; backing off");
                            tokio::time::sleep(self.retry_backoff).await;
                        }
                    }
                }
            }
        }
    }

    async fn process_message(
        &self,
        message: &BorrowedMessage<'_>,
        handler: &dyn WorkHandler,
        deliveries: &mut HashMap<String, u32>,
    ) {
        let payload = match message.payload().map(std::str::from_utf8) {
            Some(Ok(payload)) => payload,
            _ => {
                error!(
                    offset = message.offset(),
                    partition = message.partition(),
                    "discarding message with missing or non-UTF-8 payload"
                );
                self.commit(message);
                return;
            }
        };

        let envelope = match EventEnvelope::from_json(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(error = %e, offset = message.offset(), "discarding unparseable envelope");
                self.commit(message);
                return;
            }
        };

        if !envelope.is_supported_version() {
            warn!(
                schema_version = envelope.schema_version,
                thought_id = %envelope.thought_id,
                "unsupported schema version; dead-lettering"
            );
            let record = DeadLetterRecord::new(
                envelope,
                format!("unsupported schema version (this build reads {})", noema_core::SCHEMA_VERSION),
            );
            if let Err(e) = self.producer.publish_dead_letter(&record).await {
                error!(error = %e, "failed to dead-letter unsupported envelope");
            }
            self.commit(message);
            return;
        }

        // Only ThoughtCreated is a work order; the rest are informational
        // fan-out that may share the topic.
        if !matches!(envelope.body, EventBody::ThoughtCreated { .. }) {
            debug!(event_type = envelope.body.event_type(), "ignoring non-work event");
            self.commit(message);
            return;
        }

        debug!(
            thought_id = %envelope.thought_id,
            partition = message.partition(),
            offset = message.offset(),
            "dispatching work order"
        );

        let outcome = handler.handle(&envelope).await;
        let delivery_count = bump_deliveries(deliveries, &envelope.thought_id);

        // The in-process ledger resets on restart; the persisted attempt
        // counter keeps the budget honest across consumer generations.
        let effective_count = if matches!(&outcome, Err(f) if f.is_transient()) {
            let stored = self
                .sink
                .get(&envelope.thought_id)
                .await
                .ok()
                .flatten()
                .map(|t| t.attempts.max(0) as u32)
                .unwrap_or(0);
            delivery_count.max(stored)
        } else {
            delivery_count
        };

        match classify_delivery(
            outcome,
            effective_count,
            self.max_deliveries,
            self.retry_backoff,
        ) {
            Disposition::Commit => {
                deliveries.remove(&envelope.thought_id);
                self.commit(message);
            }
            Disposition::Retry { backoff } => {
                warn!(
                    thought_id = %envelope.thought_id,
                    delivery_count,
                    backoff_ms = backoff.as_millis() as u64,
                    "transient failure; leaving offset uncommitted for redelivery"
                );
                tokio::time::sleep(backoff).await;
                if let Err(e) = self.consumer.seek(
                    message.topic(),
                    message.partition(),
                    Offset::Offset(message.offset()),
                    SEEK_TIMEOUT,
                ) {
                    error!(error = %e, "seek for redelivery failed");
                }
            }
            Disposition::DeadLetter {
                reason,
                record_failure,
                kind,
            } => {
                deliveries.remove(&envelope.thought_id);
                self.dead_letter(&envelope, &reason, record_failure, kind, delivery_count)
                    .await;
                self.commit(message);
            }
        }
    }

    async fn dead_letter(
        &self,
        envelope: &EventEnvelope,
        reason: &str,
        record_failure: bool,
        kind: ErrorKind,
        delivery_count: u32,
    ) {
        // For budget exhaustion the orchestrator never reached a terminal
        // state, so the consumer owns the sink update and the failed event.
        // Permanent stage failures were already recorded downstream.
        if record_failure {
            if let Err(e) = self.sink.fail(&envelope.thought_id, kind, reason).await {
                error!(error = %e, thought_id = %envelope.thought_id, "failed to record failure");
            }
            let failed = EventEnvelope::new(
                envelope.thought_id.clone(),
                envelope.user_id.clone(),
                EventBody::ThoughtFailed {
                    error_kind: kind.as_str().to_string(),
                    error_message: reason.to_string(),
                    retry_count: delivery_count,
                },
            );
            if let Err(e) = self.bus.publish(&envelope.user_id, &failed).await {
                warn!(error = %e, "failed to publish thought_failed");
            }
        }

        let record = DeadLetterRecord::new(envelope.clone(), reason);
        if let Err(e) = self.producer.publish_dead_letter(&record).await {
            error!(error = %e, thought_id = %envelope.thought_id, "dead-letter publish failed");
        } else {
            info!(thought_id = %envelope.thought_id, reason, "envelope dead-lettered");
        }
    }

    fn commit(&self, message: &BorrowedMessage<'_>) {
        if let Err(e) = self.consumer.commit_message(message, CommitMode::Sync) {
            error!(error = %e, offset = message.offset(), "offset commit failed");
        }
    }
}

fn bump_deliveries(deliveries: &mut HashMap<String, u32>, thought_id: &str) -> u32 {
    let count = deliveries.entry(thought_id.to_string()).or_insert(0);
    *count += 1;
    *count
}

/// Decide the delivery's fate from the handler outcome and the retry
/// budget. Exponential backoff grows with the delivery count.
fn classify_delivery(
    outcome: Result<(), Failure>,
    delivery_count: u32,
    max_deliveries: u32,
    base_backoff: Duration,
) -> Disposition {
    match outcome {
        Ok(()) => Disposition::Commit,
        Err(failure) if failure.is_transient() => {
            if delivery_count >= max_deliveries {
                // The row must end up with a permanent kind: keeping the
                // pre-exhaustion transient kind would leave it reclaimable
                // on a replayed envelope after it was already dead-lettered.
                Disposition::DeadLetter {
                    reason: format!(
                        "retry budget exhausted after {delivery_count} deliveries: {failure}"
                    ),
                    record_failure: true,
                    kind: ErrorKind::RetriesExhausted,
                }
            } else {
                let exponent = delivery_count.saturating_sub(1).min(16);
                Disposition::Retry {
                    backoff: base_backoff * 2u32.pow(exponent),
                }
            }
        }
        Err(failure) => Disposition::DeadLetter {
            reason: failure.to_string(),
            // The orchestrator already failed the row and published the
            // event for permanent failures.
            record_failure: false,
            kind: failure.kind,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BACKOFF: Duration = Duration::from_millis(200);

    #[test]
    fn success_commits_immediately() {
        assert_eq!(
            classify_delivery(Ok(()), 1, 3, BACKOFF),
            Disposition::Commit
        );
    }

    #[test]
    fn transient_failure_retries_with_growing_backoff() {
        let first = classify_delivery(
            Err(Failure::new(ErrorKind::Timeout, "llm timeout")),
            1,
            3,
            BACKOFF,
        );
        assert_eq!(
            first,
            Disposition::Retry {
                backoff: Duration::from_millis(200)
            }
        );

        let second = classify_delivery(
            Err(Failure::new(ErrorKind::Timeout, "llm timeout")),
            2,
            3,
            BACKOFF,
        );
        assert_eq!(
            second,
            Disposition::Retry {
                backoff: Duration::from_millis(400)
            }
        );
    }

    #[test]
    fn exhausted_budget_dead_letters_with_permanent_kind() {
        let outcome = classify_delivery(
            Err(Failure::new(ErrorKind::Network, "still down")),
            3,
            3,
            BACKOFF,
        );
        match outcome {
            Disposition::DeadLetter {
                record_failure,
                kind,
                reason,
            } => {
                assert!(record_failure, "budget exhaustion owes sink bookkeeping");
                // Never the pre-exhaustion transient kind: the row must be
                // terminal if the same envelope is ever replayed.
                assert_eq!(kind, ErrorKind::RetriesExhausted);
                assert!(!kind.is_transient());
                assert!(reason.contains("retry budget exhausted"));
                assert!(reason.contains("still down"), "original failure kept in reason");
            }
            other => panic!("expected DeadLetter, got {other:?}"),
        }
    }

    #[test]
    fn permanent_failure_dead_letters_without_double_bookkeeping() {
        let outcome = classify_delivery(
            Err(Failure::new(ErrorKind::UnknownUser, "no context")),
            1,
            3,
            BACKOFF,
        );
        match outcome {
            Disposition::DeadLetter {
                record_failure,
                kind,
                ..
            } => {
                assert!(!record_failure, "orchestrator already recorded the failure");
                assert_eq!(kind, ErrorKind::UnknownUser);
            }
            other => panic!("expected DeadLetter, got {other:?}"),
        }
    }

    #[test]
    fn in_progress_counts_against_the_budget() {
        // A thought that keeps reporting busy is eventually dead-lettered
        // rather than redelivered forever.
        let outcome = classify_delivery(
            Err(Failure::new(ErrorKind::InProgress, "row is busy")),
            3,
            3,
            BACKOFF,
        );
        assert!(matches!(outcome, Disposition::DeadLetter { .. }));
    }

    #[test]
    fn delivery_ledger_bumps_per_thought() {
        let mut ledger = HashMap::new();
        assert_eq!(bump_deliveries(&mut ledger, "t-1"), 1);
        assert_eq!(bump_deliveries(&mut ledger, "t-1"), 2);
        assert_eq!(bump_deliveries(&mut ledger, "t-2"), 1);
    }
}
