// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Kafka producer for thought events.
//!
//! Events are keyed by `user_id` so every event for one user lands on the
//! same partition; in-partition order is the only ordering guarantee the
//! system relies on. Publishes wait for broker acknowledgement, retry
//! transient errors with jittered exponential backoff, and fail closed to
//! the caller once the budget is spent.

use std::time::Duration;

use rand::Rng;
use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tracing::{debug, info, warn};

use noema_config::model::BrokerConfig;
use noema_core::{DeadLetterRecord, ErrorKind, EventBody, EventEnvelope, Failure, NoemaError};

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// How a submit resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The broker acknowledged the event.
    Published,
    /// The producer is disabled; the thought stays `pending` for the
    /// sweeper or batch fallback to pick up.
    Deferred,
}

/// Producer handle for the work and dead-letter topics.
pub struct ThoughtProducer {
    producer: Option<FutureProducer>,
    work_topic: String,
    dlq_topic: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl ThoughtProducer {
    pub fn new(config: &BrokerConfig) -> Result<Self, NoemaError> {
        let producer = if config.enabled {
            let producer: FutureProducer = ClientConfig::new()
                .set("bootstrap.servers", &config.bootstrap_servers)
                .set("acks", "all")
                .set("linger.ms", config.linger_ms.to_string())
                .set("message.timeout.ms", DELIVERY_TIMEOUT.as_millis().to_string())
                .create()
                .map_err(|e| NoemaError::Broker {
                    message: format!("failed to create producer: {e}"),
                    source: Some(Box::new(e)),
                })?;
            Some(producer)
        } else {
            warn!("broker producer disabled; ingest degrades to deferred mode");
            None
        };

        Ok(Self {
            producer,
            work_topic: config.work_topic.clone(),
            dlq_topic: config.dlq_topic.clone(),
            max_retries: config.max_retries.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    /// Whether publishes actually reach the broker.
    pub fn is_enabled(&self) -> bool {
        self.producer.is_some()
    }

    /// Serialize and publish a `ThoughtCreated` work order.
    pub async fn submit(
        &self,
        thought_id: &str,
        user_id: &str,
        text: &str,
        priority_hint: Option<String>,
    ) -> Result<SubmitOutcome, Failure> {
        let mut envelope = EventEnvelope::created(thought_id, user_id, text);
        if let EventBody::ThoughtCreated {
            priority_hint: hint,
            ..
        } = &mut envelope.body
        {
            *hint = priority_hint;
        }
        self.publish(&envelope).await
    }

    /// Publish an envelope to the work topic.
    pub async fn publish(&self, envelope: &EventEnvelope) -> Result<SubmitOutcome, Failure> {
        let Some(producer) = &self.producer else {
            info!(
                thought_id = %envelope.thought_id,
                "producer disabled; thought left pending for deferred pickup"
            );
            return Ok(SubmitOutcome::Deferred);
        };
        let payload = envelope
            .to_json()
            .map_err(|e| Failure::new(ErrorKind::InvalidPayload, e.to_string()))?;
        self.send_with_retry(producer, &self.work_topic, &envelope.user_id, &payload)
            .await?;
        Ok(SubmitOutcome::Published)
    }

    /// Publish a dead-letter record. A no-op when the producer is disabled.
    pub async fn publish_dead_letter(&self, record: &DeadLetterRecord) -> Result<(), Failure> {
        let Some(producer) = &self.producer else {
            warn!(
                thought_id = %record.envelope.thought_id,
                "producer disabled; dead letter dropped"
            );
            return Ok(());
        };
        let payload = serde_json::to_string(record)
            .map_err(|e| Failure::new(ErrorKind::InvalidPayload, e.to_string()))?;
        self.send_with_retry(producer, &self.dlq_topic, &record.envelope.user_id, &payload)
            .await
    }

    async fn send_with_retry(
        &self,
        producer: &FutureProducer,
        topic: &str,
        key: &str,
        payload: &str,
    ) -> Result<(), Failure> {
        let mut last_failure = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let backoff = backoff_with_jitter(self.retry_backoff, attempt - 1);
                warn!(attempt, backoff_ms = backoff.as_millis() as u64, topic, "retrying publish");
                tokio::time::sleep(backoff).await;
            }

            let record = FutureRecord::to(topic).key(key).payload(payload);
            match producer.send(record, Timeout::After(DELIVERY_TIMEOUT)).await {
                Ok((partition, offset)) => {
                    debug!(topic, partition, offset, "publish acknowledged");
                    return Ok(());
                }
                Err((err, _msg)) => {
                    let failure = classify_kafka_error(&err);
                    if !failure.is_transient() {
                        return Err(failure);
                    }
                    last_failure = Some(failure);
                }
            }
        }

        Err(last_failure.unwrap_or_else(|| {
            Failure::new(ErrorKind::Network, "publish failed after retries")
        }))
    }
}

/// Exponential backoff with +/-25% jitter.
fn backoff_with_jitter(base: Duration, exponent: u32) -> Duration {
    let scaled = base.as_millis() as u64 * 2u64.pow(exponent.min(16));
    let jitter = rand::thread_rng().gen_range(0.75..=1.25);
    Duration::from_millis((scaled as f64 * jitter) as u64)
}

fn kafka_error_code(err: &KafkaError) -> Option<RDKafkaErrorCode> {
    match err {
        KafkaError::Global(code)
        | KafkaError::MessageProduction(code)
        | KafkaError::MessageConsumption(code)
        | KafkaError::MetadataFetch(code)
        | KafkaError::OffsetFetch(code) => Some(*code),
        _ => None,
    }
}

/// Map a Kafka error onto the failure taxonomy.
///
/// Connection problems, timeouts, full local queues, and leader election
/// churn are transient; everything else fails closed.
pub fn classify_kafka_error(err: &KafkaError) -> Failure {
    let kind = match kafka_error_code(err) {
        Some(
            RDKafkaErrorCode::MessageTimedOut
            | RDKafkaErrorCode::RequestTimedOut
            | RDKafkaErrorCode::OperationTimedOut,
        ) => ErrorKind::Timeout,
        Some(
            RDKafkaErrorCode::QueueFull
            | RDKafkaErrorCode::BrokerTransportFailure
            | RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::LeaderNotAvailable
            | RDKafkaErrorCode::NotLeaderForPartition
            | RDKafkaErrorCode::NetworkException
            | RDKafkaErrorCode::NotCoordinator
            | RDKafkaErrorCode::CoordinatorNotAvailable,
        ) => ErrorKind::Network,
        _ => ErrorKind::InvalidPayload,
    };
    Failure::new(kind, format!("kafka error: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disabled_config() -> BrokerConfig {
        BrokerConfig {
            enabled: false,
            ..BrokerConfig::default()
        }
    }

    #[tokio::test]
    async fn disabled_producer_defers_instead_of_publishing() {
        let producer = ThoughtProducer::new(&disabled_config()).unwrap();
        assert!(!producer.is_enabled());

        let outcome = producer.submit("t-1", "u-1", "text", None).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Deferred);
    }

    #[tokio::test]
    async fn disabled_producer_drops_dead_letters_without_error() {
        let producer = ThoughtProducer::new(&disabled_config()).unwrap();
        let record = DeadLetterRecord::new(
            EventEnvelope::created("t-1", "u-1", "text"),
            "max retries exceeded",
        );
        producer.publish_dead_letter(&record).await.unwrap();
    }

    #[test]
    fn transient_codes_classify_as_retryable() {
        let timeout = KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut);
        let failure = classify_kafka_error(&timeout);
        assert_eq!(failure.kind, ErrorKind::Timeout);
        assert!(failure.is_transient());

        let leader = KafkaError::MessageProduction(RDKafkaErrorCode::LeaderNotAvailable);
        assert_eq!(classify_kafka_error(&leader).kind, ErrorKind::Network);

        let transport = KafkaError::Global(RDKafkaErrorCode::BrokerTransportFailure);
        assert!(classify_kafka_error(&transport).is_transient());
    }

    #[test]
    fn fatal_codes_fail_closed() {
        let too_large = KafkaError::MessageProduction(RDKafkaErrorCode::MessageSizeTooLarge);
        let failure = classify_kafka_error(&too_large);
        assert!(!failure.is_transient());
    }

    #[test]
    fn backoff_grows_and_stays_within_jitter_band() {
        let base = Duration::from_millis(200);
        for exponent in 0..3 {
            let expected = 200u64 * 2u64.pow(exponent);
            let lower = (expected as f64 * 0.75) as u64;
            let upper = (expected as f64 * 1.25) as u64;
            for _ in 0..20 {
                let backoff = backoff_with_jitter(base, exponent).as_millis() as u64;
                assert!(
                    (lower..=upper).contains(&backoff),
                    "backoff {backoff}ms outside [{lower}, {upper}]"
                );
            }
        }
    }
}
