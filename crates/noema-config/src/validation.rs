// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes. Collects all violations rather than failing fast, so a bad
//! config file is reported in one pass.

use crate::model::NoemaConfig;

/// Providers the factory knows how to construct.
const KNOWN_PROVIDERS: [&str; 3] = ["anthropic", "openai", "gemini"];

/// Validate a deserialized configuration for semantic correctness.
pub fn validate_config(config: &NoemaConfig) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if config.broker.bootstrap_servers.trim().is_empty() {
        errors.push("broker.bootstrap_servers must not be empty".to_string());
    }
    if config.broker.work_topic.trim().is_empty() {
        errors.push("broker.work_topic must not be empty".to_string());
    }
    if config.broker.dlq_topic == config.broker.work_topic {
        errors.push("broker.dlq_topic must differ from broker.work_topic".to_string());
    }
    if config.broker.partitions == 0 {
        errors.push("broker.partitions must be at least 1".to_string());
    }
    if config.broker.batch_size == 0 {
        errors.push("broker.batch_size must be at least 1".to_string());
    }

    if config.fanout.bus_url.trim().is_empty() {
        errors.push("fanout.bus_url must not be empty".to_string());
    }
    if config.fanout.heartbeat_interval_seconds == 0 {
        errors.push("fanout.heartbeat_interval_seconds must be at least 1".to_string());
    }
    if config.fanout.max_connections_per_instance == 0 {
        errors.push("fanout.max_connections_per_instance must be at least 1".to_string());
    }

    if !(0.0..=1.0).contains(&config.cache.similarity_threshold) {
        errors.push(format!(
            "cache.similarity_threshold must be in [0, 1], got {}",
            config.cache.similarity_threshold
        ));
    }
    if config.cache.ttl_days == 0 {
        errors.push("cache.ttl_days must be at least 1".to_string());
    }
    if config.cache.embedding_dimension == 0 {
        errors.push("cache.embedding_dimension must be at least 1".to_string());
    }

    if config.pipeline.pipeline_max_attempts == 0 {
        errors.push("pipeline.pipeline_max_attempts must be at least 1".to_string());
    }
    if config.pipeline.stuck_grace_minutes == 0 {
        errors.push("pipeline.stuck_grace_minutes must be at least 1".to_string());
    }

    if !KNOWN_PROVIDERS.contains(&config.provider.provider.as_str()) {
        errors.push(format!(
            "provider.provider `{}` is not one of {KNOWN_PROVIDERS:?}",
            config.provider.provider
        ));
    }
    if config.provider.max_output_tokens == 0 {
        errors.push("provider.max_output_tokens must be at least 1".to_string());
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push("storage.database_path must not be empty".to_string());
    }

    if config.gateway.host.trim().is_empty() {
        errors.push("gateway.host must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = NoemaConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn collects_multiple_errors() {
        let mut config = NoemaConfig::default();
        config.cache.similarity_threshold = 1.5;
        config.broker.partitions = 0;
        config.provider.provider = "mistral".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("similarity_threshold")));
        assert!(errors.iter().any(|e| e.contains("partitions")));
        assert!(errors.iter().any(|e| e.contains("mistral")));
    }

    #[test]
    fn dlq_must_differ_from_work_topic() {
        let mut config = NoemaConfig::default();
        config.broker.dlq_topic = config.broker.work_topic.clone();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("dlq_topic")));
    }

    #[test]
    fn threshold_bounds_are_inclusive() {
        let mut config = NoemaConfig::default();
        config.cache.similarity_threshold = 1.0;
        assert!(validate_config(&config).is_ok());
        config.cache.similarity_threshold = 0.0;
        assert!(validate_config(&config).is_ok());
    }
}
