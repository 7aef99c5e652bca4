// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process fan-out bus over tokio broadcast channels.
//!
//! One broadcast channel per user id, created on first use. Used by the
//! test suite and by single-node deployments that do not need a
//! process-external bus.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::trace;

use noema_core::{EventEnvelope, NoemaError, ProgressBus, ProgressStream};

const CHANNEL_CAPACITY: usize = 256;

/// In-process implementation of [`ProgressBus`].
#[derive(Default)]
pub struct MemoryBus {
    channels: Arc<DashMap<String, broadcast::Sender<EventEnvelope>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, user_id: &str) -> broadcast::Sender<EventEnvelope> {
        self.channels
            .entry(user_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Live receiver count for a user (used by tests and the health surface).
    pub fn subscriber_count(&self, user_id: &str) -> usize {
        self.channels
            .get(user_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl ProgressBus for MemoryBus {
    async fn publish(&self, user_id: &str, event: &EventEnvelope) -> Result<(), NoemaError> {
        // send() errs only when there is no subscriber; best-effort delivery
        // means that is a drop, not a failure.
        let receivers = self.sender(user_id).send(event.clone()).unwrap_or(0);
        trace!(user_id, receivers, event_type = event.body.event_type(), "published");
        Ok(())
    }

    async fn subscribe(&self, user_id: &str) -> Result<ProgressStream, NoemaError> {
        let receiver = self.sender(user_id).subscribe();
        // Lagged subscribers skip ahead; missed events are not replayed.
        let stream = BroadcastStream::new(receiver).filter_map(|item| async move { item.ok() });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noema_core::EventBody;

    fn processing_event(thought_id: &str, user_id: &str) -> EventEnvelope {
        EventEnvelope::new(thought_id, user_id, EventBody::ThoughtProcessing)
    }

    #[tokio::test]
    async fn subscriber_receives_published_events_in_order() {
        let bus = MemoryBus::new();
        let mut stream = bus.subscribe("u-1").await.unwrap();

        for thought in ["t-1", "t-2", "t-3"] {
            bus.publish("u-1", &processing_event(thought, "u-1")).await.unwrap();
        }

        for expected in ["t-1", "t-2", "t-3"] {
            let event = stream.next().await.unwrap();
            assert_eq!(event.thought_id, expected);
        }
    }

    #[tokio::test]
    async fn publish_without_subscriber_is_dropped() {
        let bus = MemoryBus::new();
        bus.publish("u-1", &processing_event("t-0", "u-1")).await.unwrap();

        // A later subscriber must not see the earlier event (no replay).
        let mut stream = bus.subscribe("u-1").await.unwrap();
        bus.publish("u-1", &processing_event("t-1", "u-1")).await.unwrap();
        let event = stream.next().await.unwrap();
        assert_eq!(event.thought_id, "t-1");
    }

    #[tokio::test]
    async fn channels_are_per_user() {
        let bus = MemoryBus::new();
        let mut u1 = bus.subscribe("u-1").await.unwrap();
        let _u2 = bus.subscribe("u-2").await.unwrap();

        bus.publish("u-2", &processing_event("t-u2", "u-2")).await.unwrap();
        bus.publish("u-1", &processing_event("t-u1", "u-1")).await.unwrap();

        // u-1's first event is its own, not u-2's.
        let event = u1.next().await.unwrap();
        assert_eq!(event.user_id, "u-1");
    }

    #[tokio::test]
    async fn dropping_stream_releases_subscription() {
        let bus = MemoryBus::new();
        let stream = bus.subscribe("u-1").await.unwrap();
        assert_eq!(bus.subscriber_count("u-1"), 1);

        drop(stream);
        assert_eq!(bus.subscriber_count("u-1"), 0);
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let bus = MemoryBus::new();
        let mut a = bus.subscribe("u-1").await.unwrap();
        let mut b = bus.subscribe("u-1").await.unwrap();

        bus.publish("u-1", &processing_event("t-1", "u-1")).await.unwrap();

        assert_eq!(a.next().await.unwrap().thought_id, "t-1");
        assert_eq!(b.next().await.unwrap().thought_id, "t-1");
    }
}
