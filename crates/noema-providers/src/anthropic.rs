// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Messages API adapter.
//!
//! Supports native prompt caching: the request's cacheable context is sent
//! as a separate system block carrying a `cache_control` marker, so the
//! user-profile portion of the prompt is cached across the five stages of a
//! run.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use noema_core::types::{ChatRequest, ChatResponse, ProviderCapabilities, TokenUsage};
use noema_core::{ErrorKind, Failure, NoemaError, ProviderAdapter};

use crate::classify::{classify_status, classify_transport};

const API_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_CONTEXT_TOKENS: u32 = 200_000;

/// Adapter for the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    client: reqwest::Client,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
    /// Create a new adapter.
    pub fn new(api_key: &str, model: impl Into<String>) -> Result<Self, NoemaError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key)
                .map_err(|e| NoemaError::Config(format!("invalid API key header value: {e}")))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| NoemaError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            model: model.into(),
            base_url: API_BASE_URL.to_string(),
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    fn build_request(&self, request: &ChatRequest) -> MessageRequest {
        let mut system = vec![SystemBlock {
            block_type: "text",
            text: request.system.clone(),
            cache_control: None,
        }];
        if let Some(context) = &request.cacheable_context {
            system.push(SystemBlock {
                block_type: "text",
                text: context.clone(),
                cache_control: Some(CacheControl { control_type: "ephemeral" }),
            });
        }

        MessageRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            system,
            messages: request
                .messages
                .iter()
                .map(|m| ApiMessage {
                    role: m.role.as_str(),
                    content: m.content.clone(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_prompt_cache: true,
            max_context_tokens: MAX_CONTEXT_TOKENS,
        }
    }

    async fn generate(&self, request: ChatRequest) -> Result<ChatResponse, Failure> {
        let body = self.build_request(&request);

        let response = self
            .client
            .post(&self.base_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport("anthropic", &e))?;

        let status = response.status();
        debug!(status = %status, model = %self.model, "anthropic response received");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status("anthropic", status.as_u16(), &body));
        }

        let parsed: MessageResponse = response.json().await.map_err(|e| {
            Failure::new(
                ErrorKind::InvalidPayload,
                format!("failed to parse anthropic response: {e}"),
            )
        })?;

        let content = parsed
            .content
            .iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text.as_str()),
            })
            .collect::<Vec<_>>()
            .join("");

        Ok(ChatResponse {
            content,
            usage: TokenUsage {
                input_tokens: parsed.usage.input_tokens,
                output_tokens: parsed.usage.output_tokens,
                cache_read_tokens: parsed.usage.cache_read_input_tokens,
                cache_creation_tokens: parsed.usage.cache_creation_input_tokens,
            },
        })
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: u32,
    system: Vec<SystemBlock>,
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Serialize)]
struct SystemBlock {
    #[serde(rename = "type")]
    block_type: &'static str,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

#[derive(Debug, Serialize)]
struct CacheControl {
    #[serde(rename = "type")]
    control_type: &'static str,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ResponseBlock>,
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    input_tokens: u64,
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
}
