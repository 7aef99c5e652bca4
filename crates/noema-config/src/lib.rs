// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the Noema pipeline.
//!
//! A single statically typed config tree, loaded from TOML with `NOEMA_*`
//! environment overrides. Unknown keys are rejected at load; semantic
//! violations are collected by [`validation::validate_config`].

pub mod loader;
pub mod model;
pub mod validation;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::NoemaConfig;
pub use validation::validate_config;
