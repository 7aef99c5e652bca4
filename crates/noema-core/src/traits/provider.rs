// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter trait for LLM integrations (Anthropic, OpenAI, Gemini).

use async_trait::async_trait;

use crate::error::Failure;
use crate::types::{ChatRequest, ChatResponse, ProviderCapabilities};

/// Adapter for LLM provider integrations.
///
/// Errors are reported as classified [`Failure`]s so that the agent stages
/// can apply the retry taxonomy uniformly across providers. Adapters must
/// ignore the request's cache hint when they do not support prompt caching;
/// correctness never depends on it.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Short identifier, e.g. `"anthropic"`.
    fn name(&self) -> &str;

    /// Static capabilities of this provider and model.
    fn capabilities(&self) -> ProviderCapabilities;

    /// Send a completion request and return the full response.
    async fn generate(&self, request: ChatRequest) -> Result<ChatResponse, Failure>;
}
