// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Progress fan-out bus trait.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::NoemaError;
use crate::event::EventEnvelope;

/// A live subscription to one user's progress channel.
pub type ProgressStream = Pin<Box<dyn Stream<Item = EventEnvelope> + Send>>;

/// Pub/sub bus broadcasting progress events to subscribers.
///
/// Delivery is best-effort with no replay: events published while nobody is
/// subscribed are dropped. Publish order is preserved per user. Dropping the
/// returned stream releases the subscription's resources within bounded
/// time.
#[async_trait]
pub trait ProgressBus: Send + Sync {
    /// Publish an event on the user's channel.
    async fn publish(&self, user_id: &str, event: &EventEnvelope) -> Result<(), NoemaError>;

    /// Subscribe to the user's channel.
    async fn subscribe(&self, user_id: &str) -> Result<ProgressStream, NoemaError>;
}
