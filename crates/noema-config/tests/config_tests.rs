// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Noema configuration system.

use noema_config::{load_config_from_str, validate_config};

/// Valid TOML with all known fields deserializes successfully.
#[test]
fn valid_toml_deserializes_into_noema_config() {
    let toml = r#"
[broker]
bootstrap_servers = "kafka-1:9092,kafka-2:9092"
work_topic = "thoughts"
dlq_topic = "thoughts-dlq"
consumer_group = "workers"
partitions = 6
max_retries = 5
retry_backoff_ms = 100
batch_size = 32
linger_ms = 5
enabled = false

[fanout]
bus_url = "redis://bus:6379"
channel_prefix = "progress"
heartbeat_interval_seconds = 15
max_connections_per_instance = 200

[cache]
similarity_threshold = 0.95
ttl_days = 14
embedding_dimension = 1536

[pipeline]
agent_internal_retries = 1
pipeline_max_attempts = 4
stuck_grace_minutes = 20
sweep_interval_seconds = 60
drain_seconds = 30

[provider]
provider = "gemini"
model = "gemini-2.0-flash"
api_key = "key-123"
max_output_tokens = 1500
embedding_model = "text-embedding-004"

[storage]
database_path = "/var/lib/noema/noema.db"
wal_mode = false

[gateway]
host = "0.0.0.0"
port = 9000

[runtime]
log_level = "debug"
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.broker.bootstrap_servers, "kafka-1:9092,kafka-2:9092");
    assert_eq!(config.broker.work_topic, "thoughts");
    assert_eq!(config.broker.partitions, 6);
    assert!(!config.broker.enabled);
    assert_eq!(config.fanout.channel_prefix, "progress");
    assert_eq!(config.fanout.max_connections_per_instance, 200);
    assert_eq!(config.cache.similarity_threshold, 0.95);
    assert_eq!(config.cache.embedding_dimension, 1536);
    assert_eq!(config.pipeline.pipeline_max_attempts, 4);
    assert_eq!(config.provider.provider, "gemini");
    assert_eq!(config.provider.api_key.as_deref(), Some("key-123"));
    assert_eq!(config.storage.database_path, "/var/lib/noema/noema.db");
    assert_eq!(config.gateway.port, 9000);
    assert_eq!(config.runtime.log_level, "debug");

    validate_config(&config).expect("config should validate");
}

/// Empty TOML uses compiled defaults for every section.
#[test]
fn missing_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert_eq!(config.broker.bootstrap_servers, "localhost:9092");
    assert_eq!(config.broker.work_topic, "thought-processing");
    assert_eq!(config.broker.dlq_topic, "thought-processing-dlq");
    assert_eq!(config.broker.consumer_group, "thought-workers");
    assert_eq!(config.broker.partitions, 3);
    assert_eq!(config.broker.max_retries, 3);
    assert_eq!(config.broker.batch_size, 16);
    assert!(config.broker.enabled);
    assert_eq!(config.fanout.channel_prefix, "updates");
    assert_eq!(config.fanout.heartbeat_interval_seconds, 30);
    assert_eq!(config.fanout.max_connections_per_instance, 1000);
    assert_eq!(config.cache.similarity_threshold, 0.92);
    assert_eq!(config.cache.ttl_days, 7);
    assert_eq!(config.pipeline.agent_internal_retries, 2);
    assert_eq!(config.pipeline.pipeline_max_attempts, 3);
    assert_eq!(config.pipeline.stuck_grace_minutes, 10);
    assert_eq!(config.provider.provider, "anthropic");
    assert!(config.provider.api_key.is_none());
    assert_eq!(config.runtime.log_level, "info");
}

/// Unknown keys are rejected at load, not silently ignored.
#[test]
fn unknown_field_is_rejected() {
    let toml = r#"
[broker]
work_topik = "thoughts"
"#;
    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("work_topik"),
        "error should mention the bad key, got: {err_str}"
    );
}

/// Unknown top-level section is rejected.
#[test]
fn unknown_section_is_rejected() {
    let toml = r#"
[metrics]
enabled = true
"#;
    assert!(load_config_from_str(toml).is_err());
}

/// Partial sections keep defaults for unset fields.
#[test]
fn partial_section_keeps_defaults() {
    let toml = r#"
[cache]
similarity_threshold = 1.0
"#;
    let config = load_config_from_str(toml).unwrap();
    assert_eq!(config.cache.similarity_threshold, 1.0);
    assert_eq!(config.cache.ttl_days, 7);
    assert_eq!(config.cache.embedding_dimension, 768);
}

/// A type mismatch is a load error.
#[test]
fn type_mismatch_is_rejected() {
    let toml = r#"
[broker]
partitions = "three"
"#;
    assert!(load_config_from_str(toml).is_err());
}
