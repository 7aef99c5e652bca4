// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Redis pub/sub implementation of the progress bus.
//!
//! Publishing rides a shared multiplexed connection; each subscription gets
//! its own pub/sub connection, which closes when the returned stream is
//! dropped. Per-user channels are named `<prefix>:<user_id>` so multiple
//! gateway instances can serve the same user.

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{debug, warn};

use noema_core::{EventEnvelope, NoemaError, ProgressBus, ProgressStream};

fn bus_err(message: impl Into<String>, e: redis::RedisError) -> NoemaError {
    NoemaError::Bus {
        message: message.into(),
        source: Some(Box::new(e)),
    }
}

/// Redis-backed implementation of [`ProgressBus`].
pub struct RedisBus {
    client: redis::Client,
    publish_conn: MultiplexedConnection,
    prefix: String,
}

impl RedisBus {
    /// Connect to the bus and verify the connection with a PING.
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, NoemaError> {
        let client = redis::Client::open(url)
            .map_err(|e| bus_err(format!("invalid bus url {url}"), e))?;
        let mut publish_conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| bus_err("failed to connect to bus", e))?;

        redis::cmd("PING")
            .query_async::<()>(&mut publish_conn)
            .await
            .map_err(|e| bus_err("bus did not answer PING", e))?;

        let prefix = prefix.into();
        debug!(url, prefix = %prefix, "fan-out bus connected");
        Ok(Self {
            client,
            publish_conn,
            prefix,
        })
    }

    fn channel_name(&self, user_id: &str) -> String {
        channel_name(&self.prefix, user_id)
    }
}

/// Channel naming shared with tooling: `<prefix>:<user_id>`.
pub fn channel_name(prefix: &str, user_id: &str) -> String {
    format!("{prefix}:{user_id}")
}

#[async_trait]
impl ProgressBus for RedisBus {
    async fn publish(&self, user_id: &str, event: &EventEnvelope) -> Result<(), NoemaError> {
        let channel = self.channel_name(user_id);
        let payload = event.to_json()?;
        let mut conn = self.publish_conn.clone();
        // The receiver count is informational; zero means the event is
        // dropped, which best-effort delivery allows.
        let receivers: i64 = conn
            .publish(&channel, payload)
            .await
            .map_err(|e| bus_err(format!("failed to publish on {channel}"), e))?;
        debug!(channel = %channel, receivers, event_type = event.body.event_type(), "published");
        Ok(())
    }

    async fn subscribe(&self, user_id: &str) -> Result<ProgressStream, NoemaError> {
        let channel = self.channel_name(user_id);
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| bus_err("failed to open pub/sub connection", e))?;
        pubsub
            .subscribe(&channel)
            .await
            .map_err(|e| bus_err(format!("failed to subscribe to {channel}"), e))?;

        // The stream owns the pub/sub connection: dropping it tears the
        // subscription down.
        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = match msg.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, "dropping undecodable bus message");
                    return None;
                }
            };
            match EventEnvelope::from_json(&payload) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(error = %e, "dropping unparseable bus message");
                    None
                }
            }
        });
        Ok(Box::pin(stream))
    }
}
