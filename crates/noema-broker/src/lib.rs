// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Kafka work broker for the Noema pipeline.
//!
//! The producer publishes `ThoughtCreated` work orders keyed by user id;
//! the consumer-group worker pulls them, dispatches to a [`WorkHandler`],
//! and owns the commit/retry/dead-letter discipline.

pub mod consumer;
pub mod producer;

pub use consumer::{ThoughtConsumer, WorkHandler};
pub use producer::{classify_kafka_error, SubmitOutcome, ThoughtProducer};
