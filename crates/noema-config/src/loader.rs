// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Merge order (later overrides earlier): compiled defaults,
//! `/etc/noema/noema.toml`, `./noema.toml`, then `NOEMA_*` environment
//! variables. Unknown keys fail extraction because every model struct
//! denies unknown fields.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::NoemaConfig;

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<NoemaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(NoemaConfig::default()))
        .merge(Toml::file("/etc/noema/noema.toml"))
        .merge(Toml::file("noema.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from an inline TOML string (testing and tooling).
pub fn load_config_from_str(toml_content: &str) -> Result<NoemaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(NoemaConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<NoemaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(NoemaConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Environment variable provider using explicit `map()` for section-to-dot
/// mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `NOEMA_BROKER_WORK_TOPIC` must map to
/// `broker.work_topic`, not `broker.work.topic`.
fn env_provider() -> Env {
    Env::prefixed("NOEMA_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("broker_", "broker.", 1)
            .replacen("fanout_", "fanout.", 1)
            .replacen("cache_", "cache.", 1)
            .replacen("pipeline_", "pipeline.", 1)
            .replacen("provider_", "provider.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("gateway_", "gateway.", 1)
            .replacen("runtime_", "runtime.", 1);
        mapped.into()
    })
}
