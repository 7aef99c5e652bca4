// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI chat-completions adapter.
//!
//! No explicit prompt-cache control exists on this API, so the cache hint is
//! folded into the system prompt and the capability flag stays false.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use noema_core::types::{ChatRequest, ChatResponse, ProviderCapabilities, TokenUsage};
use noema_core::{ErrorKind, Failure, NoemaError, ProviderAdapter};

use crate::classify::{classify_status, classify_transport};

const API_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";
const MAX_CONTEXT_TOKENS: u32 = 128_000;

/// Adapter for the OpenAI chat-completions API.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, model: impl Into<String>) -> Result<Self, NoemaError> {
        let mut headers = HeaderMap::new();
        let bearer = format!("Bearer {api_key}");
        headers.insert(
            "authorization",
            HeaderValue::from_str(&bearer)
                .map_err(|e| NoemaError::Config(format!("invalid API key header value: {e}")))?,
        );
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

    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_prompt_cache: false,
            max_context_tokens: MAX_CONTEXT_TOKENS,
        }
    }

    async fn generate(&self, request: ChatRequest) -> Result<ChatResponse, Failure> {
        // Cache hint unsupported: fold the cacheable context into the
        // system message.
        let system = match &request.cacheable_context {
            Some(context) => format!("{}\n\n{context}", request.system),
            None => request.system.clone(),
        };

        let mut messages = vec![WireMessage {
            role: "system".into(),
            content: system,
        }];
        messages.extend(request.messages.iter().map(|m| WireMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        }));

        let body = CompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(&self.base_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport("openai", &e))?;

        let status = response.status();
        debug!(status = %status, model = %self.model, "openai response received");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status("openai", status.as_u16(), &body));
        }

        let parsed: CompletionResponse = response.json().await.map_err(|e| {
            Failure::new(
                ErrorKind::InvalidPayload,
                format!("failed to parse openai response: {e}"),
            )
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| {
                Failure::new(ErrorKind::InvalidPayload, "openai response had no choices")
            })?;

        Ok(ChatResponse {
            content,
            usage: TokenUsage {
                input_tokens: parsed.usage.prompt_tokens,
                output_tokens: parsed.usage.completion_tokens,
                cache_read_tokens: 0,
                cache_creation_tokens: 0,
            },
        })
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use noema_core::types::ChatMessage;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_provider(base_url: &str) -> OpenAiProvider {
        OpenAiProvider::new("sk-test", "gpt-4o")
            .unwrap()
            .with_base_url(base_url.to_string())
    }

    fn test_request() -> ChatRequest {
        ChatRequest {
            system: "You analyze personal thoughts.".into(),
            cacheable_context: Some("USER CONTEXT:\n{}".into()),
            messages: vec![ChatMessage::user("Classify this.")],
            max_tokens: 800,
        }
    }

    #[tokio::test]
    async fn generate_success() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"type\": \"task\"}"}}],
            "usage": {"prompt_tokens": 50, "completion_tokens": 12}
        });
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let provider = test_provider(&server.uri());
        let response = provider.generate(test_request()).await.unwrap();
        assert_eq!(response.content, "{\"type\": \"task\"}");
        assert_eq!(response.usage.input_tokens, 50);
        assert_eq!(response.usage.output_tokens, 12);
    }

    #[tokio::test]
    async fn cache_hint_folds_into_system_message() {
        let server = MockServer::start().await;
        Mock::given(body_partial_json(serde_json::json!({
            "messages": [
                {"role": "system", "content": "You analyze personal thoughts.\n\nUSER CONTEXT:\n{}"},
                {"role": "user", "content": "Classify this."}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "ok"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

        let provider = test_provider(&server.uri());
        provider.generate(test_request()).await.unwrap();
    }

    #[tokio::test]
    async fn quota_error_is_permanent() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "error": {"code": "insufficient_quota", "message": "You exceeded your quota"}
        });
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_json(&body))
            .mount(&server)
            .await;

        let provider = test_provider(&server.uri());
        let failure = provider.generate(test_request()).await.unwrap_err();
        assert_eq!(failure.kind, ErrorKind::QuotaExhausted);
    }

    #[tokio::test]
    async fn empty_choices_is_invalid_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": []
            })))
            .mount(&server)
            .await;

        let provider = test_provider(&server.uri());
        let failure = provider.generate(test_request()).await.unwrap_err();
        assert_eq!(failure.kind, ErrorKind::InvalidPayload);
    }

    #[test]
    fn capabilities_do_not_claim_prompt_cache() {
        let provider = OpenAiProvider::new("k", "gpt-4o").unwrap();
        assert!(!provider.capabilities().supports_prompt_cache);
        assert_eq!(provider.name(), "openai");
    }
}
