// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Noema pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so unrecognized keys are
//! rejected at startup rather than silently ignored.

use serde::{Deserialize, Serialize};

/// Top-level Noema configuration.
///
/// Loaded from TOML with environment variable overrides. All sections are
/// optional and default to local-development values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NoemaConfig {
    /// Kafka broker settings.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Progress fan-out bus settings.
    #[serde(default)]
    pub fanout: FanoutConfig,

    /// Semantic cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Pipeline retry and recovery settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// LLM and embedding provider settings.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// SQLite storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Ingest/SSE gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Process-level runtime settings.
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Kafka broker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
    /// Comma-separated Kafka bootstrap servers.
    #[serde(default = "default_bootstrap_servers")]
    pub bootstrap_servers: String,

    /// Primary work topic.
    #[serde(default = "default_work_topic")]
    pub work_topic: String,

    /// Dead-letter topic for permanently failed envelopes.
    #[serde(default = "default_dlq_topic")]
    pub dlq_topic: String,

    /// Consumer group id.
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,

    /// Partition count of the work topic.
    #[serde(default = "default_partitions")]
    pub partitions: u32,

    /// Producer publish attempts before failing closed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff between producer retries, in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Consumer prefetch batch size.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Producer linger, in milliseconds.
    #[serde(default = "default_linger_ms")]
    pub linger_ms: u64,

    /// Whether the producer publishes at all. When false, ingest degrades
    /// to deferred mode and the sweeper picks pending thoughts up.
    #[serde(default = "default_broker_enabled")]
    pub enabled: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: default_bootstrap_servers(),
            work_topic: default_work_topic(),
            dlq_topic: default_dlq_topic(),
            consumer_group: default_consumer_group(),
            partitions: default_partitions(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            batch_size: default_batch_size(),
            linger_ms: default_linger_ms(),
            enabled: default_broker_enabled(),
        }
    }
}

fn default_bootstrap_servers() -> String {
    "localhost:9092".to_string()
}

fn default_work_topic() -> String {
    "thought-processing".to_string()
}

fn default_dlq_topic() -> String {
    "thought-processing-dlq".to_string()
}

fn default_consumer_group() -> String {
    "thought-workers".to_string()
}

fn default_partitions() -> u32 {
    3
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_batch_size() -> u32 {
    16
}

fn default_linger_ms() -> u64 {
    10
}

fn default_broker_enabled() -> bool {
    true
}

/// Progress fan-out configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FanoutConfig {
    /// Redis URL of the pub/sub bus.
    #[serde(default = "default_bus_url")]
    pub bus_url: String,

    /// Channel name prefix; channels are `<prefix>:<user_id>`.
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,

    /// SSE heartbeat interval, in seconds.
    #[serde(default = "default_heartbeat_interval_seconds")]
    pub heartbeat_interval_seconds: u64,

    /// Cap on concurrent SSE subscriptions per gateway instance.
    #[serde(default = "default_max_connections_per_instance")]
    pub max_connections_per_instance: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            bus_url: default_bus_url(),
            channel_prefix: default_channel_prefix(),
            heartbeat_interval_seconds: default_heartbeat_interval_seconds(),
            max_connections_per_instance: default_max_connections_per_instance(),
        }
    }
}

fn default_bus_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_channel_prefix() -> String {
    "updates".to_string()
}

fn default_heartbeat_interval_seconds() -> u64 {
    30
}

fn default_max_connections_per_instance() -> usize {
    1000
}

/// Semantic cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Minimum cosine similarity for a hit. 1.0 degenerates to exact match.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Entry lifetime from creation, in days.
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u32,

    /// Dimension of stored embeddings; the store and the similarity
    /// function must agree on it.
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            ttl_days: default_ttl_days(),
            embedding_dimension: default_embedding_dimension(),
        }
    }
}

fn default_similarity_threshold() -> f64 {
    0.92
}

fn default_ttl_days() -> u32 {
    7
}

fn default_embedding_dimension() -> usize {
    768
}

/// Pipeline retry and recovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Internal retries per agent stage before bubbling the failure.
    #[serde(default = "default_agent_internal_retries")]
    pub agent_internal_retries: u32,

    /// Consumer delivery budget per thought.
    #[serde(default = "default_pipeline_max_attempts")]
    pub pipeline_max_attempts: u32,

    /// Minutes a thought may sit in `processing` before the sweeper acts.
    #[serde(default = "default_stuck_grace_minutes")]
    pub stuck_grace_minutes: u64,

    /// Sweeper scan interval, in seconds.
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,

    /// Graceful-shutdown drain deadline, in seconds.
    #[serde(default = "default_drain_seconds")]
    pub drain_seconds: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            agent_internal_retries: default_agent_internal_retries(),
            pipeline_max_attempts: default_pipeline_max_attempts(),
            stuck_grace_minutes: default_stuck_grace_minutes(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
            drain_seconds: default_drain_seconds(),
        }
    }
}

fn default_agent_internal_retries() -> u32 {
    2
}

fn default_pipeline_max_attempts() -> u32 {
    3
}

fn default_stuck_grace_minutes() -> u64 {
    10
}

fn default_sweep_interval_seconds() -> u64 {
    120
}

fn default_drain_seconds() -> u64 {
    60
}

/// LLM and embedding provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Provider tag: `anthropic`, `openai`, or `gemini`.
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier for the agent stages.
    #[serde(default = "default_model")]
    pub model: String,

    /// API key. `None` requires the provider's environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Maximum tokens per stage completion.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Embedding model identifier.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            max_output_tokens: default_max_output_tokens(),
            embedding_model: default_embedding_model(),
        }
    }
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_output_tokens() -> u32 {
    2000
}

fn default_embedding_model() -> String {
    "text-embedding-004".to_string()
}

/// SQLite storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    "noema.db".to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// Gateway HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Process-level runtime configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
