// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits implemented by the pluggable backends.

pub mod bus;
pub mod embedding;
pub mod provider;

pub use bus::{ProgressBus, ProgressStream};
pub use embedding::EmbeddingAdapter;
pub use provider::ProviderAdapter;
