// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM and embedding provider adapters for the Noema pipeline.
//!
//! Three chat backends implement [`noema_core::ProviderAdapter`] behind one
//! interface: Anthropic (with native prompt caching), OpenAI, and Gemini.
//! The matching embedding adapters feed the semantic cache. Adapters
//! classify errors onto the pipeline failure taxonomy and leave retrying to
//! the agent stages.

pub mod anthropic;
mod classify;
pub mod embedding;
pub mod factory;
pub mod gemini;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use embedding::{GeminiEmbedder, OpenAiEmbedder};
pub use factory::{build_providers, ProviderSet};
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
